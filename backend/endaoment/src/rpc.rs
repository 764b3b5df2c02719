//! Ethereum JSON-RPC client implementing [`Chain`].
//!
//! ## Resilience
//!
//! * Exponential back-off is applied to transport failures, rate limiting and
//!   `-32005` (limit exceeded), up to [`MAX_BACKOFF_SECS`] seconds.
//! * Every other JSON-RPC error is returned immediately; messages mentioning a
//!   revert become [`EndaomentError::Reverted`].
//! * Receipts are polled until they appear. There is no overall timeout, the
//!   caller waits for confirmation.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::abi::{self, Address, Token};
use crate::artifacts;
use crate::chain::{Chain, Deployment, FunctionCall, TxReceipt};
use crate::contracts::ContractId;
use crate::errors::{EndaomentError, Result};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RawReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    pub from: String,
    pub to: Option<String>,
    #[serde(rename = "contractAddress")]
    pub contract_address: Option<String>,
    #[serde(rename = "gasUsed")]
    pub gas_used: String,
    /// `0x1` success, `0x0` revert
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

#[derive(Debug, PartialEq, Eq)]
enum ErrorAction {
    Retry,
    Fail,
    Revert,
}

fn classify(err: &RpcError) -> ErrorAction {
    match err.code {
        -32005 => ErrorAction::Retry,
        _ if err.message.to_lowercase().contains("revert") => ErrorAction::Revert,
        _ => ErrorAction::Fail,
    }
}

// ─────────────────────────────────────────────────────────
// Hex helpers
// ─────────────────────────────────────────────────────────

fn parse_quantity(raw: &str) -> Result<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| EndaomentError::Rpc(format!("invalid hex quantity: {raw}")))
}

fn parse_address(raw: &str) -> Result<Address> {
    raw.parse()
        .map_err(|_| EndaomentError::Rpc(format!("invalid address from node: {raw}")))
}

fn parse_data(raw: &str) -> Result<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| EndaomentError::Rpc(format!("invalid hex data from node: {e}")))
}

impl RawReceipt {
    fn into_receipt(self) -> Result<TxReceipt> {
        let status = match self.status.as_deref() {
            Some(s) => parse_quantity(s)? == 1,
            // Pre-Byzantium receipts carry no status
            None => true,
        };
        Ok(TxReceipt {
            block_number: parse_quantity(&self.block_number)?,
            from: parse_address(&self.from)?,
            to: self.to.as_deref().map(parse_address).transpose()?,
            contract_address: self.contract_address.as_deref().map(parse_address).transpose()?,
            gas_used: parse_quantity(&self.gas_used)?,
            status,
            logs: self.logs,
            transaction_hash: self.transaction_hash,
            block_hash: self.block_hash,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

pub struct JsonRpcChain {
    client: Client,
    rpc_url: String,
    network: String,
    artifacts_dir: PathBuf,
    poll_interval: Duration,
}

impl JsonRpcChain {
    pub fn new(
        rpc_url: impl Into<String>,
        network: impl Into<String>,
        artifacts_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        JsonRpcChain {
            client: Client::new(),
            rpc_url: rpc_url.into(),
            network: network.into(),
            artifacts_dir: artifacts_dir.into(),
            poll_interval,
        }
    }

    /// Issue one JSON-RPC request, retrying transient failures.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let mut backoff = INITIAL_BACKOFF_SECS;

        loop {
            let response = self
                .client
                .post(&self.rpc_url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method,
                    "params": params,
                }))
                .send()
                .await;

            match response {
                Err(e) => {
                    warn!("RPC {method} failed (will retry in {backoff}s): {e}");
                }
                Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    warn!("Rate-limited by RPC (will retry in {backoff}s)");
                }
                Ok(resp) => {
                    let body: RpcResponse = resp.json().await?;
                    let Some(err) = body.error else {
                        return Ok(body.result.unwrap_or(Value::Null));
                    };
                    match classify(&err) {
                        ErrorAction::Retry => {
                            warn!(
                                "RPC soft error (will retry in {backoff}s): {} {}",
                                err.code, err.message
                            );
                        }
                        ErrorAction::Revert => return Err(EndaomentError::Reverted(err.message)),
                        ErrorAction::Fail => {
                            return Err(EndaomentError::Rpc(format!(
                                "RPC error {}: {}",
                                err.code, err.message
                            )))
                        }
                    }
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
        }
    }

    async fn send_transaction(&self, tx: Value) -> Result<TxReceipt> {
        let hash = self.request("eth_sendTransaction", json!([tx])).await?;
        let hash = hash
            .as_str()
            .ok_or_else(|| EndaomentError::Rpc("eth_sendTransaction returned no hash".to_string()))?
            .to_string();
        debug!("Submitted transaction {hash}");
        self.wait_for_receipt(&hash).await
    }

    /// Poll until the transaction is mined. A failed status is a revert.
    async fn wait_for_receipt(&self, hash: &str) -> Result<TxReceipt> {
        loop {
            let raw = self.request("eth_getTransactionReceipt", json!([hash])).await?;
            if !raw.is_null() {
                let receipt = serde_json::from_value::<RawReceipt>(raw)?.into_receipt()?;
                if !receipt.status {
                    return Err(EndaomentError::Reverted(format!(
                        "transaction {hash} reverted in block {}",
                        receipt.block_number
                    )));
                }
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl Chain for JsonRpcChain {
    fn network(&self) -> &str {
        &self.network
    }

    async fn chain_id(&self) -> Result<u64> {
        let id = self.request("eth_chainId", json!([])).await?;
        parse_quantity(id.as_str().unwrap_or_default())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        let accounts: Vec<String> = serde_json::from_value(self.request("eth_accounts", json!([])).await?)?;
        accounts.iter().map(|a| parse_address(a)).collect()
    }

    async fn deploy(&self, from: Address, contract: ContractId, args: Vec<Token>) -> Result<Deployment> {
        let artifact = artifacts::load(&self.artifacts_dir, contract)?;
        let mut data = artifact.bytecode;
        data.extend(abi::encode(&args));

        let receipt = self
            .send_transaction(json!({
                "from": from.to_string(),
                "data": format!("0x{}", hex::encode(data)),
            }))
            .await?;
        let address = receipt.contract_address.ok_or_else(|| {
            EndaomentError::Rpc(format!(
                "receipt {} for {contract} has no contract address",
                receipt.transaction_hash
            ))
        })?;
        info!("Deployed {contract} at {address} (tx {})", receipt.transaction_hash);
        Ok(Deployment {
            address,
            abi: artifact.abi,
            receipt,
        })
    }

    async fn send(&self, from: Address, to: Address, call: &FunctionCall) -> Result<TxReceipt> {
        let data = abi::encode_function_call(call.signature, &call.args);
        self.send_transaction(json!({
            "from": from.to_string(),
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        }))
        .await
    }

    async fn call(&self, to: Address, call: &FunctionCall) -> Result<Vec<Token>> {
        let data = abi::encode_function_call(call.signature, &call.args);
        let result = self
            .request(
                "eth_call",
                json!([{ "to": to.to_string(), "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        let bytes = parse_data(result.as_str().unwrap_or("0x"))?;
        abi::decode(&call.returns, &bytes)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> RpcError {
        RpcError {
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn classifies_rpc_errors() {
        assert_eq!(classify(&rpc_error(-32005, "limit exceeded")), ErrorAction::Retry);
        assert_eq!(
            classify(&rpc_error(3, "execution reverted: ERC20: insufficient allowance")),
            ErrorAction::Revert
        );
        assert_eq!(classify(&rpc_error(-32601, "method not found")), ErrorAction::Fail);
        assert_eq!(classify(&rpc_error(-32000, "insufficient funds for gas")), ErrorAction::Fail);
    }

    #[test]
    fn parses_quantities() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn converts_node_receipt() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockHash": "0xdef",
            "blockNumber": "0x10",
            "from": "0x2fa252f1b0b095e1ed6ba6dfdc40abe04d42b5d1",
            "to": null,
            "contractAddress": "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf",
            "gasUsed": "0x5208",
            "status": "0x1",
            "logs": []
        }))
        .unwrap();

        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.status);
        assert!(receipt.to.is_none());
        assert_eq!(
            receipt.contract_address.unwrap().to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn failed_status_is_reported() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": "0xabc",
            "blockHash": "0xdef",
            "blockNumber": "0x1",
            "from": "0x2fa252f1b0b095e1ed6ba6dfdc40abe04d42b5d1",
            "to": "0x2fa252f1b0b095e1ed6ba6dfdc40abe04d42b5d1",
            "contractAddress": null,
            "gasUsed": "0x1",
            "status": "0x0"
        }))
        .unwrap();
        assert!(!raw.into_receipt().unwrap().status);
    }
}
