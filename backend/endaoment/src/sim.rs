//! [`Chain`] implementation over the in-process simulation ledger.
//!
//! Calls are dispatched on `(contract kind, function name)` using the same
//! canonical signatures a node would receive, so the orchestrator and flows
//! cannot tell the two chains apart. Every transaction is mined immediately.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use endaoment_sim::{Constructor, ContractKind, Event, Ledger, Receipt, Role};
use serde_json::{json, Value};
use tracing::debug;

use crate::abi::{self, Address, Token};
use crate::chain::{Chain, Deployment, FunctionCall, TxReceipt};
use crate::config::SIM_NETWORK;
use crate::contracts::ContractId;
use crate::errors::{EndaomentError, Result};

/// Chain id reported by the simulation (Hardhat's local default).
pub const SIM_CHAIN_ID: u64 = 31337;

pub struct SimChain {
    ledger: Mutex<Ledger>,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    pub fn new() -> Self {
        SimChain {
            ledger: Mutex::new(Ledger::new()),
        }
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| EndaomentError::Rpc("simulation ledger lock poisoned".to_string()))
    }
}

fn kind_of(contract: ContractId) -> ContractKind {
    match contract {
        ContractId::MockUsdc => ContractKind::MockUsdc,
        ContractId::MockAavePool => ContractKind::MockAavePool,
        ContractId::TimelockController => ContractKind::TimelockController,
        ContractId::YieldSplitter => ContractKind::YieldSplitter,
        ContractId::StudentSbt => ContractKind::StudentSbt,
        ContractId::MyGovernor => ContractKind::MyGovernor,
        ContractId::LosslessVault => ContractKind::LosslessVault,
        ContractId::UniversityRegistry => ContractKind::UniversityRegistry,
        ContractId::DonationTracker => ContractKind::DonationTracker,
        ContractId::StudentRegistry => ContractKind::StudentRegistry,
    }
}

/// Map a revert onto the message a node would report.
fn reverted(err: endaoment_sim::Error) -> EndaomentError {
    EndaomentError::Reverted(format!(
        "execution reverted: {err} (code {})",
        err.code()
    ))
}

// ─────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────

const DEFAULT_ADMIN_ROLE: [u8; 32] = [0u8; 32];

fn role_hash(role: Role) -> [u8; 32] {
    match role {
        Role::Admin => DEFAULT_ADMIN_ROLE,
        Role::Proposer => abi::keccak256(b"PROPOSER_ROLE"),
        Role::Executor => abi::keccak256(b"EXECUTOR_ROLE"),
        Role::Canceller => abi::keccak256(b"CANCELLER_ROLE"),
    }
}

fn role_from_hash(hash: [u8; 32]) -> Result<Role> {
    [Role::Admin, Role::Proposer, Role::Executor, Role::Canceller]
        .into_iter()
        .find(|role| role_hash(*role) == hash)
        .ok_or_else(|| EndaomentError::Reverted(format!("unknown role 0x{}", hex::encode(hash))))
}

// ─────────────────────────────────────────────────────────
// Argument cursor
// ─────────────────────────────────────────────────────────

struct Args {
    context: String,
    tokens: std::vec::IntoIter<Token>,
}

impl Args {
    fn new(context: &str, tokens: Vec<Token>) -> Self {
        Args {
            context: context.to_string(),
            tokens: tokens.into_iter(),
        }
    }

    fn mismatch(&self) -> EndaomentError {
        EndaomentError::Abi(format!("argument mismatch for {}", self.context))
    }

    fn address(&mut self) -> Result<Address> {
        self.tokens.next().and_then(Token::into_address).ok_or_else(|| self.mismatch())
    }

    fn uint(&mut self) -> Result<u128> {
        self.tokens.next().and_then(Token::into_uint).ok_or_else(|| self.mismatch())
    }

    fn uint_u64(&mut self) -> Result<u64> {
        u64::try_from(self.uint()?).map_err(|_| self.mismatch())
    }

    fn uint_u32(&mut self) -> Result<u32> {
        u32::try_from(self.uint()?).map_err(|_| self.mismatch())
    }

    fn string(&mut self) -> Result<String> {
        self.tokens.next().and_then(Token::into_string).ok_or_else(|| self.mismatch())
    }

    fn bytes32(&mut self) -> Result<[u8; 32]> {
        self.tokens.next().and_then(Token::into_bytes32).ok_or_else(|| self.mismatch())
    }

    fn addresses(&mut self) -> Result<Vec<Address>> {
        let items = self.tokens.next().and_then(Token::into_array).ok_or_else(|| self.mismatch())?;
        items
            .into_iter()
            .map(|t| t.into_address().ok_or_else(|| self.mismatch()))
            .collect()
    }
}

fn constructor(contract: ContractId, args: Vec<Token>) -> Result<Constructor> {
    let mut a = Args::new(contract.name(), args);
    Ok(match contract {
        ContractId::MockUsdc => Constructor::MockUsdc,
        ContractId::MockAavePool => Constructor::MockAavePool { asset: a.address()? },
        ContractId::TimelockController => Constructor::TimelockController {
            min_delay: a.uint_u64()?,
            proposers: a.addresses()?,
            executors: a.addresses()?,
            cancellers: a.addresses()?,
        },
        ContractId::YieldSplitter => Constructor::YieldSplitter {
            asset: a.address()?,
            university_wallet: a.address()?,
            timelock: a.address()?,
        },
        ContractId::StudentSbt => Constructor::StudentSbt {
            name: a.string()?,
            symbol: a.string()?,
        },
        ContractId::MyGovernor => Constructor::MyGovernor {
            token: a.address()?,
            timelock: a.address()?,
            voting_delay: a.uint_u64()?,
            voting_period: a.uint_u64()?,
            quorum_percentage: a.uint_u64()?,
        },
        ContractId::LosslessVault => Constructor::LosslessVault {
            asset: a.address()?,
            name: a.string()?,
            symbol: a.string()?,
            pool: a.address()?,
            splitter: a.address()?,
        },
        ContractId::UniversityRegistry => Constructor::UniversityRegistry,
        ContractId::DonationTracker => Constructor::DonationTracker,
        ContractId::StudentRegistry => Constructor::StudentRegistry,
    })
}

/// Signatures the simulated contract understands, recorded as its ABI.
fn human_abi(kind: ContractKind) -> &'static [&'static str] {
    match kind {
        ContractKind::MockUsdc => &[
            "function mint(address,uint256)",
            "function addMinter(address)",
            "function faucet()",
            "function transfer(address,uint256)",
            "function approve(address,uint256)",
            "function balanceOf(address) view returns (uint256)",
            "function allowance(address,address) view returns (uint256)",
            "function totalSupply() view returns (uint256)",
            "function owner() view returns (address)",
            "function minters(address) view returns (bool)",
        ],
        ContractKind::MockAavePool => &[
            "function adminAddYield(uint256)",
            "function totalSupply() view returns (uint256)",
            "function getAvailableYield() view returns (uint256)",
            "function getTotalAssets() view returns (uint256)",
        ],
        ContractKind::TimelockController => &[
            "function grantRole(bytes32,address)",
            "function hasRole(bytes32,address) view returns (bool)",
            "function getMinDelay() view returns (uint256)",
            "function PROPOSER_ROLE() view returns (bytes32)",
            "function EXECUTOR_ROLE() view returns (bytes32)",
            "function CANCELLER_ROLE() view returns (bytes32)",
            "function DEFAULT_ADMIN_ROLE() view returns (bytes32)",
        ],
        ContractKind::YieldSplitter => &[
            "function universityWallet() view returns (address)",
            "function timelockController() view returns (address)",
            "function totalSplit() view returns (uint256)",
        ],
        ContractKind::StudentSbt => &[
            "function addAuthorizedMinter(address)",
            "function transferFrom(address,address,uint256)",
            "function hasSBT(address) view returns (bool)",
            "function votingPower(address) view returns (uint256)",
            "function totalSupply() view returns (uint256)",
            "function authorizedMinters(address) view returns (bool)",
        ],
        ContractKind::MyGovernor => &[
            "function getVotes(address) view returns (uint256)",
            "function votingDelay() view returns (uint256)",
            "function votingPeriod() view returns (uint256)",
            "function quorumNumerator() view returns (uint256)",
            "function token() view returns (address)",
            "function timelock() view returns (address)",
        ],
        ContractKind::LosslessVault => &[
            "function deposit(uint256,address)",
            "function withdraw(uint256,address,address)",
            "function harvestYield()",
            "function balanceOf(address) view returns (uint256)",
            "function convertToAssets(uint256) view returns (uint256)",
            "function convertToShares(uint256) view returns (uint256)",
            "function totalAssets() view returns (uint256)",
            "function totalSupply() view returns (uint256)",
            "function totalHarvested() view returns (uint256)",
        ],
        ContractKind::UniversityRegistry => &[
            "function registerUniversity(string,string,address)",
            "function lockUniversityWallet(string)",
            "function setUniversityWallet(string,address)",
            "function isUniversityRegistered(string) view returns (bool)",
            "function getUniversity(string) view returns (string,address,bool)",
            "function universityCount() view returns (uint256)",
        ],
        ContractKind::DonationTracker => &[
            "function registerUniversity(address,string)",
            "function recordDonation(address,uint256)",
            "function recordYield(address,uint256)",
            "function isUniversityRegistered(address) view returns (bool)",
            "function getTotalDonations(address) view returns (uint256)",
            "function getTotalYieldDistributed(address) view returns (uint256)",
        ],
        ContractKind::StudentRegistry => &[
            "function setStudentSBT(address)",
            "function registerStudent(string,string,string,string,uint256,uint256,uint256)",
            "function isRegistered(address) view returns (bool)",
            "function getVotingPower(address) view returns (uint256)",
            "function studentSBT() view returns (address)",
        ],
    }
}

fn event_json(at: &Address, event: &Event) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("address".to_string(), json!(at.to_string()));
    }
    value
}

fn to_tx_receipt(receipt: Receipt) -> TxReceipt {
    let block_hash = abi::keccak256(&receipt.block_number.to_be_bytes());
    TxReceipt {
        transaction_hash: format!("0x{}", hex::encode(receipt.transaction_hash)),
        block_hash: format!("0x{}", hex::encode(block_hash)),
        block_number: receipt.block_number,
        from: receipt.from,
        to: receipt.to,
        contract_address: receipt.contract_address,
        gas_used: receipt.gas_used,
        status: true,
        logs: receipt.logs.iter().map(|(at, event)| event_json(at, event)).collect(),
    }
}

// ─────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────

fn dispatch_send(
    ledger: &mut Ledger,
    from: Address,
    to: Address,
    call: &FunctionCall,
) -> Result<Receipt> {
    let kind = ledger
        .kind_of(&to)
        .ok_or_else(|| EndaomentError::Reverted(format!("no contract deployed at {to}")))?;
    let name = abi::function_name(call.signature);
    let mut a = Args::new(call.signature, call.args.clone());

    let outcome = match (kind, name) {
        (ContractKind::MockUsdc, "mint") => {
            let (who, amount) = (a.address()?, a.uint()?);
            ledger.mint(from, to, who, amount)
        }
        (ContractKind::MockUsdc, "addMinter") => ledger.add_minter(from, to, a.address()?),
        (ContractKind::MockUsdc, "faucet") => ledger.faucet(from, to),
        (ContractKind::MockUsdc, "transfer") => {
            let (recipient, amount) = (a.address()?, a.uint()?);
            ledger.transfer(from, to, recipient, amount)
        }
        (ContractKind::MockUsdc, "approve") => {
            let (spender, amount) = (a.address()?, a.uint()?);
            ledger.approve(from, to, spender, amount)
        }
        (ContractKind::MockAavePool, "adminAddYield") => ledger.admin_add_yield(from, to, a.uint()?),
        (ContractKind::TimelockController, "grantRole") => {
            let role = role_from_hash(a.bytes32()?)?;
            ledger.grant_role(from, to, role, a.address()?)
        }
        (ContractKind::StudentSbt, "addAuthorizedMinter") => {
            ledger.add_authorized_minter(from, to, a.address()?)
        }
        (ContractKind::StudentSbt, "transferFrom") => {
            let _owner = a.address()?;
            ledger.transfer_sbt(from, to, a.address()?)
        }
        (ContractKind::LosslessVault, "deposit") => {
            let (assets, receiver) = (a.uint()?, a.address()?);
            ledger.deposit(from, to, assets, receiver)
        }
        (ContractKind::LosslessVault, "withdraw") => {
            let (assets, receiver, owner) = (a.uint()?, a.address()?, a.address()?);
            ledger.withdraw(from, to, assets, receiver, owner)
        }
        (ContractKind::LosslessVault, "harvestYield") => ledger.harvest_yield(from, to),
        (ContractKind::UniversityRegistry, "registerUniversity") => {
            let (id, name, wallet) = (a.string()?, a.string()?, a.address()?);
            ledger.register_university(from, to, &id, &name, wallet)
        }
        (ContractKind::UniversityRegistry, "lockUniversityWallet") => {
            ledger.lock_university_wallet(from, to, &a.string()?)
        }
        (ContractKind::UniversityRegistry, "setUniversityWallet") => {
            let (id, wallet) = (a.string()?, a.address()?);
            ledger.set_university_wallet(from, to, &id, wallet)
        }
        (ContractKind::DonationTracker, "registerUniversity") => {
            let (wallet, name) = (a.address()?, a.string()?);
            ledger.tracker_register_university(from, to, wallet, &name)
        }
        (ContractKind::DonationTracker, "recordDonation") => {
            let (wallet, amount) = (a.address()?, a.uint()?);
            ledger.record_donation(from, to, wallet, amount)
        }
        (ContractKind::DonationTracker, "recordYield") => {
            let (wallet, amount) = (a.address()?, a.uint()?);
            ledger.record_yield(from, to, wallet, amount)
        }
        (ContractKind::StudentRegistry, "setStudentSBT") => ledger.set_student_sbt(from, to, a.address()?),
        (ContractKind::StudentRegistry, "registerStudent") => {
            let (name, university, research_area, student_id) =
                (a.string()?, a.string()?, a.string()?, a.string()?);
            let (academic, sports, student) = (a.uint_u32()?, a.uint_u32()?, a.uint_u32()?);
            ledger.register_student(
                from,
                to,
                &name,
                &university,
                &research_area,
                &student_id,
                academic,
                sports,
                student,
            )
        }
        _ => {
            return Err(EndaomentError::Reverted(format!(
                "{kind:?} at {to} has no function {}",
                call.signature
            )))
        }
    };

    outcome.map_err(reverted)
}

fn dispatch_call(ledger: &Ledger, to: Address, call: &FunctionCall) -> Result<Vec<Token>> {
    let kind = ledger
        .kind_of(&to)
        .ok_or_else(|| EndaomentError::Reverted(format!("no contract deployed at {to}")))?;
    let name = abi::function_name(call.signature);
    let mut a = Args::new(call.signature, call.args.clone());
    let uint = |v: u128| vec![Token::Uint(v)];
    let boolean = |b: bool| vec![Token::Bool(b)];
    let address = |x: Address| vec![Token::Address(x)];

    let tokens = match (kind, name) {
        (ContractKind::MockUsdc, "balanceOf") => uint(ledger.balance_of(to, a.address()?).map_err(reverted)?),
        (ContractKind::MockUsdc, "allowance") => {
            let (owner, spender) = (a.address()?, a.address()?);
            uint(ledger.allowance(to, owner, spender).map_err(reverted)?)
        }
        (ContractKind::MockUsdc, "totalSupply") => uint(ledger.total_supply(to).map_err(reverted)?),
        (ContractKind::MockUsdc, "owner") => address(ledger.token_owner(to).map_err(reverted)?),
        (ContractKind::MockUsdc, "minters") => boolean(ledger.is_minter(to, a.address()?).map_err(reverted)?),

        (ContractKind::MockAavePool, "totalSupply") => uint(ledger.pool_principal(to).map_err(reverted)?),
        (ContractKind::MockAavePool, "getAvailableYield") => {
            uint(ledger.available_yield(to).map_err(reverted)?)
        }
        (ContractKind::MockAavePool, "getTotalAssets") => {
            uint(ledger.pool_total_assets(to).map_err(reverted)?)
        }

        (ContractKind::TimelockController, "hasRole") => {
            let role = role_from_hash(a.bytes32()?)?;
            boolean(ledger.has_role(to, role, a.address()?).map_err(reverted)?)
        }
        (ContractKind::TimelockController, "getMinDelay") => {
            uint(u128::from(ledger.min_delay(to).map_err(reverted)?))
        }
        (ContractKind::TimelockController, "PROPOSER_ROLE") => vec![Token::Bytes32(role_hash(Role::Proposer))],
        (ContractKind::TimelockController, "EXECUTOR_ROLE") => vec![Token::Bytes32(role_hash(Role::Executor))],
        (ContractKind::TimelockController, "CANCELLER_ROLE") => vec![Token::Bytes32(role_hash(Role::Canceller))],
        (ContractKind::TimelockController, "DEFAULT_ADMIN_ROLE") => vec![Token::Bytes32(DEFAULT_ADMIN_ROLE)],

        (ContractKind::YieldSplitter, "universityWallet") => {
            address(ledger.splitter_university_wallet(to).map_err(reverted)?)
        }
        (ContractKind::YieldSplitter, "timelockController") => {
            address(ledger.splitter_timelock(to).map_err(reverted)?)
        }
        (ContractKind::YieldSplitter, "totalSplit") => uint(ledger.splitter_total_split(to).map_err(reverted)?),

        (ContractKind::StudentSbt, "hasSBT") => boolean(ledger.has_sbt(to, a.address()?).map_err(reverted)?),
        (ContractKind::StudentSbt, "votingPower") => {
            uint(u128::from(ledger.sbt_voting_power(to, a.address()?).map_err(reverted)?))
        }
        (ContractKind::StudentSbt, "totalSupply") => {
            uint(u128::from(ledger.sbt_total_supply(to).map_err(reverted)?))
        }
        (ContractKind::StudentSbt, "authorizedMinters") => {
            boolean(ledger.is_authorized_minter(to, a.address()?).map_err(reverted)?)
        }

        (ContractKind::MyGovernor, "getVotes") => {
            uint(u128::from(ledger.get_votes(to, a.address()?).map_err(reverted)?))
        }
        (ContractKind::MyGovernor, "votingDelay") => {
            uint(u128::from(ledger.governor_settings(to).map_err(reverted)?.voting_delay))
        }
        (ContractKind::MyGovernor, "votingPeriod") => {
            uint(u128::from(ledger.governor_settings(to).map_err(reverted)?.voting_period))
        }
        (ContractKind::MyGovernor, "quorumNumerator") => {
            uint(u128::from(ledger.governor_settings(to).map_err(reverted)?.quorum_percentage))
        }
        (ContractKind::MyGovernor, "token") => address(ledger.governor_settings(to).map_err(reverted)?.token),
        (ContractKind::MyGovernor, "timelock") => {
            address(ledger.governor_settings(to).map_err(reverted)?.timelock)
        }

        (ContractKind::LosslessVault, "balanceOf") => {
            uint(ledger.vault_balance_of(to, a.address()?).map_err(reverted)?)
        }
        (ContractKind::LosslessVault, "convertToAssets") => {
            uint(ledger.convert_to_assets(to, a.uint()?).map_err(reverted)?)
        }
        (ContractKind::LosslessVault, "convertToShares") => {
            uint(ledger.convert_to_shares(to, a.uint()?).map_err(reverted)?)
        }
        (ContractKind::LosslessVault, "totalAssets") => uint(ledger.vault_total_assets(to).map_err(reverted)?),
        (ContractKind::LosslessVault, "totalSupply") => uint(ledger.vault_total_supply(to).map_err(reverted)?),
        (ContractKind::LosslessVault, "totalHarvested") => {
            uint(ledger.vault_total_harvested(to).map_err(reverted)?)
        }

        (ContractKind::UniversityRegistry, "isUniversityRegistered") => {
            boolean(ledger.is_university_registered(to, &a.string()?).map_err(reverted)?)
        }
        (ContractKind::UniversityRegistry, "getUniversity") => {
            let id = a.string()?;
            let entry = ledger
                .university(to, &id)
                .map_err(reverted)?
                .ok_or_else(|| reverted(endaoment_sim::Error::NotRegistered))?;
            vec![
                Token::String(entry.name),
                Token::Address(entry.wallet),
                Token::Bool(entry.locked),
            ]
        }
        (ContractKind::UniversityRegistry, "universityCount") => {
            uint(u128::from(ledger.university_count(to).map_err(reverted)?))
        }

        (ContractKind::DonationTracker, "isUniversityRegistered") => {
            boolean(ledger.is_tracked_university(to, a.address()?).map_err(reverted)?)
        }
        (ContractKind::DonationTracker, "getTotalDonations") => {
            uint(ledger.total_donations(to, a.address()?).map_err(reverted)?)
        }
        (ContractKind::DonationTracker, "getTotalYieldDistributed") => {
            uint(ledger.total_yield_distributed(to, a.address()?).map_err(reverted)?)
        }

        (ContractKind::StudentRegistry, "isRegistered") => {
            boolean(ledger.is_student_registered(to, a.address()?).map_err(reverted)?)
        }
        (ContractKind::StudentRegistry, "getVotingPower") => {
            let student = ledger.student(to, a.address()?).map_err(reverted)?;
            uint(student.map(|s| u128::from(s.voting_power_tenths)).unwrap_or(0))
        }
        (ContractKind::StudentRegistry, "studentSBT") => {
            address(ledger.student_registry_sbt(to).map_err(reverted)?.unwrap_or(Address::ZERO))
        }

        _ => {
            return Err(EndaomentError::Reverted(format!(
                "{kind:?} at {to} has no view {}",
                call.signature
            )))
        }
    };
    Ok(tokens)
}

#[async_trait]
impl Chain for SimChain {
    fn network(&self) -> &str {
        SIM_NETWORK
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(SIM_CHAIN_ID)
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.ledger()?.accounts().to_vec())
    }

    async fn deploy(&self, from: Address, contract: ContractId, args: Vec<Token>) -> Result<Deployment> {
        let kind = kind_of(contract);
        let receipt = self
            .ledger()?
            .deploy(from, constructor(contract, args)?)
            .map_err(reverted)?;
        let address = receipt.contract_address.ok_or_else(|| {
            EndaomentError::Rpc(format!("deployment of {contract} returned no address"))
        })?;
        debug!("sim: deployed {contract} at {address}");
        Ok(Deployment {
            address,
            abi: json!(human_abi(kind)),
            receipt: to_tx_receipt(receipt),
        })
    }

    async fn send(&self, from: Address, to: Address, call: &FunctionCall) -> Result<TxReceipt> {
        let receipt = dispatch_send(&mut *self.ledger()?, from, to, call)?;
        Ok(to_tx_receipt(receipt))
    }

    async fn call(&self, to: Address, call: &FunctionCall) -> Result<Vec<Token>> {
        dispatch_call(&*self.ledger()?, to, call)
    }
}
