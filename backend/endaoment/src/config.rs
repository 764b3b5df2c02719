//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use crate::abi::Address;
use crate::errors::{EndaomentError, Result};

/// Network name that selects the in-process chain.
pub const SIM_NETWORK: &str = "sim";

#[derive(Debug, Clone)]
pub struct Config {
    /// Target network name; `sim` runs the contracts in process
    pub network: String,
    /// JSON-RPC endpoint for every other network
    pub rpc_url: String,
    /// SQLite deployment record store
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Directory of compiled `<Name>.json` artifacts
    pub artifacts_dir: PathBuf,
    /// Directory holding the university wallet files
    pub wallets_dir: PathBuf,
    /// Persisted client session
    pub session_path: PathBuf,
    /// Named deployer signer; first node account when unset
    pub deployer: Option<Address>,
    /// Institutional treasury override; deployer when unset
    pub university_wallet: Option<Address>,
    /// Recipient override for the USDC transfer script
    pub target_address: Option<Address>,
    /// Receipt polling interval in milliseconds
    pub confirmation_poll_ms: u64,
    /// IPFS HTTP API used for ID document uploads
    pub ipfs_api_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            network: env_var("NETWORK").unwrap_or_else(|_| SIM_NETWORK.to_string()),
            rpc_url: env_var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8545".to_string()),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./endaoment.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| EndaomentError::Config("Invalid API_PORT".to_string()))?,
            artifacts_dir: env_var("ARTIFACTS_DIR")
                .unwrap_or_else(|_| "./artifacts".to_string())
                .into(),
            wallets_dir: env_var("WALLETS_DIR").unwrap_or_else(|_| ".".to_string()).into(),
            session_path: env_var("SESSION_PATH")
                .unwrap_or_else(|_| "./.endaoment-session.json".to_string())
                .into(),
            deployer: optional_address("DEPLOYER_ADDRESS")?,
            university_wallet: optional_address("UNIVERSITY_WALLET")?,
            target_address: optional_address("TARGET_ADDRESS")?,
            confirmation_poll_ms: env_var("CONFIRMATION_POLL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| EndaomentError::Config("Invalid CONFIRMATION_POLL_MS".to_string()))?,
            ipfs_api_url: env_var("IPFS_API_URL").ok().filter(|url| !url.is_empty()),
        })
    }

    pub fn is_sim(&self) -> bool {
        self.network == SIM_NETWORK
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| EndaomentError::Config(format!("Missing env var: {key}")))
}

/// Read an optional address; present but malformed is an error.
fn optional_address(key: &str) -> Result<Option<Address>> {
    match env_var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| EndaomentError::Config(format!("Invalid {key}: {raw}"))),
        Err(_) => Ok(None),
    }
}
