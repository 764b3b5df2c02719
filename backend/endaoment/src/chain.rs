//! Chain access behind one trait, so the orchestrator and the flows run
//! unchanged against a JSON-RPC node or the in-process simulation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::abi::{Address, ParamType, Token};
use crate::contracts::ContractId;
use crate::errors::Result;

/// One contract function invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// Canonical signature, e.g. `deposit(uint256,address)`
    pub signature: &'static str,
    pub args: Vec<Token>,
    /// Return types decoded by [`Chain::call`]
    pub returns: Vec<ParamType>,
}

impl FunctionCall {
    pub fn new(signature: &'static str, args: Vec<Token>) -> Self {
        FunctionCall {
            signature,
            args,
            returns: Vec::new(),
        }
    }

    pub fn returning(mut self, returns: Vec<ParamType>) -> Self {
        self.returns = returns;
        self
    }
}

/// Confirmed transaction receipt, as persisted in deployment records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub status: bool,
    pub logs: Vec<Value>,
}

/// Result of a contract deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub address: Address,
    pub abi: Value,
    pub receipt: TxReceipt,
}

#[async_trait]
pub trait Chain: Send + Sync {
    /// Network name the chain was opened for.
    fn network(&self) -> &str;

    async fn chain_id(&self) -> Result<u64>;

    /// Signer accounts available for sending; index 0 is the default deployer.
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Deploy a contract and wait for its confirmation.
    async fn deploy(&self, from: Address, contract: ContractId, args: Vec<Token>)
        -> Result<Deployment>;

    /// Submit a state-changing call and wait for its confirmation. Reverts
    /// surface as [`EndaomentError::Reverted`](crate::errors::EndaomentError::Reverted).
    async fn send(&self, from: Address, to: Address, call: &FunctionCall) -> Result<TxReceipt>;

    /// Read-only call, decoded with `call.returns`.
    async fn call(&self, to: Address, call: &FunctionCall) -> Result<Vec<Token>>;
}
