//! Compiled contract artifacts (`<ARTIFACTS_DIR>/<Name>.json`).
//!
//! Accepts both the Hardhat layout (`"bytecode": "0x…"`) and the Foundry
//! layout (`"bytecode": { "object": "0x…" }`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::contracts::ContractId;
use crate::errors::{EndaomentError, Result};

#[derive(Debug, Clone)]
pub struct Artifact {
    pub abi: Value,
    pub bytecode: Vec<u8>,
}

#[derive(Deserialize)]
struct RawArtifact {
    abi: Value,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

pub fn artifact_path(dir: &Path, contract: ContractId) -> PathBuf {
    dir.join(format!("{}.json", contract.name()))
}

pub fn load(dir: &Path, contract: ContractId) -> Result<Artifact> {
    let path = artifact_path(dir, contract);
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        EndaomentError::Artifact(format!("cannot read {}: {e}", path.display()))
    })?;
    parse(&raw).map_err(|e| EndaomentError::Artifact(format!("{}: {e}", path.display())))
}

fn parse(raw: &str) -> std::result::Result<Artifact, String> {
    let artifact: RawArtifact = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let code = match artifact.bytecode {
        RawBytecode::Hex(code) | RawBytecode::Object { object: code } => code,
    };
    let code = code.trim_start_matches("0x");
    if code.is_empty() {
        return Err("bytecode is empty (abstract contract or interface?)".to_string());
    }
    let bytecode = hex::decode(code).map_err(|e| format!("bytecode is not hex: {e}"))?;
    Ok(Artifact {
        abi: artifact.abi,
        bytecode,
    })
}
