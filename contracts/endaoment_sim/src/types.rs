//! # Types
//!
//! Shared data structures used across the simulated contract suite.
//!
//! ## Addresses
//!
//! [`Address`] is a plain 20-byte EVM address. Signer accounts and contract
//! addresses are derived from a per-ledger nonce, so two ledgers built the same
//! way hand out the same addresses in the same order.
//!
//! ## Receipts
//!
//! Every mutating entry point mines exactly one block and returns a
//! [`Receipt`]. A reverted call returns an error instead and mines nothing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A 20-byte account or contract address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

/// First byte of derived signer accounts.
const ACCOUNT_TAG: u8 = 0xa0;
/// First byte of derived contract addresses.
const CONTRACT_TAG: u8 = 0xc0;

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub(crate) fn derive_account(nonce: u64) -> Self {
        Self::derive(ACCOUNT_TAG, nonce)
    }

    pub(crate) fn derive_contract(nonce: u64) -> Self {
        Self::derive(CONTRACT_TAG, nonce)
    }

    fn derive(tag: u8, nonce: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[0] = tag;
        bytes[12..].copy_from_slice(&nonce.to_be_bytes());
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Error returned when a string is not a `0x`-prefixed 40-digit hex address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid address: {0}")]
pub struct ParseAddressError(pub String);

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 40 {
            return Err(ParseAddressError(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ParseAddressError(s.to_string()))?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which contract lives at an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContractKind {
    MockUsdc,
    MockAavePool,
    TimelockController,
    YieldSplitter,
    StudentSbt,
    MyGovernor,
    LosslessVault,
    UniversityRegistry,
    DonationTracker,
    StudentRegistry,
}

/// Timelock access-control roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Proposer,
    Executor,
    Canceller,
}

/// Constructor arguments, one variant per deployable contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Constructor {
    MockUsdc,
    MockAavePool {
        asset: Address,
    },
    TimelockController {
        min_delay: u64,
        proposers: Vec<Address>,
        executors: Vec<Address>,
        cancellers: Vec<Address>,
    },
    YieldSplitter {
        asset: Address,
        university_wallet: Address,
        timelock: Address,
    },
    StudentSbt {
        name: String,
        symbol: String,
    },
    MyGovernor {
        token: Address,
        timelock: Address,
        voting_delay: u64,
        voting_period: u64,
        quorum_percentage: u64,
    },
    LosslessVault {
        asset: Address,
        name: String,
        symbol: String,
        pool: Address,
        splitter: Address,
    },
    UniversityRegistry,
    DonationTracker,
    StudentRegistry,
}

impl Constructor {
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::MockUsdc => ContractKind::MockUsdc,
            Self::MockAavePool { .. } => ContractKind::MockAavePool,
            Self::TimelockController { .. } => ContractKind::TimelockController,
            Self::YieldSplitter { .. } => ContractKind::YieldSplitter,
            Self::StudentSbt { .. } => ContractKind::StudentSbt,
            Self::MyGovernor { .. } => ContractKind::MyGovernor,
            Self::LosslessVault { .. } => ContractKind::LosslessVault,
            Self::UniversityRegistry => ContractKind::UniversityRegistry,
            Self::DonationTracker => ContractKind::DonationTracker,
            Self::StudentRegistry => ContractKind::StudentRegistry,
        }
    }
}

/// Log entries emitted by the simulated contracts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum Event {
    Transfer { from: Address, to: Address, value: u128 },
    Approval { owner: Address, spender: Address, value: u128 },
    MinterAdded { minter: Address },
    YieldAdded { amount: u128 },
    Deposit { sender: Address, owner: Address, assets: u128, shares: u128 },
    Withdraw { sender: Address, receiver: Address, owner: Address, assets: u128, shares: u128 },
    YieldHarvested { amount: u128 },
    YieldSplit { university: u128, dao: u128 },
    RoleGranted { role: String, account: Address },
    AuthorizedMinterAdded { minter: Address },
    SbtMinted { to: Address, token_id: u64 },
    UniversityRegistered { id: String, wallet: Address },
    UniversityWalletLocked { id: String },
    DonationRecorded { university: Address, amount: u128 },
    StudentRegistered { student: Address, voting_power_tenths: u32 },
}

/// Outcome of one mined transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: [u8; 32],
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub logs: Vec<(Address, Event)>,
}

/// On-chain university entry in the governance-facing registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniversityEntry {
    pub id: String,
    pub name: String,
    pub wallet: Address,
    pub locked: bool,
}

/// On-chain student entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentEntry {
    pub name: String,
    pub university: String,
    pub research_area: String,
    pub student_id: String,
    pub academic_achievements: u32,
    pub sports_achievements: u32,
    pub student_achievements: u32,
    pub voting_power_tenths: u32,
}
