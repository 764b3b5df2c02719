//! # Storage
//!
//! Per-contract state held by the [`Ledger`](crate::Ledger).
//!
//! | Contract             | State struct                | Notes                                   |
//! |----------------------|-----------------------------|-----------------------------------------|
//! | `MockUSDC`           | [`TokenState`]              | balances, allowances, minter set        |
//! | `MockAavePool`       | [`PoolState`]               | principal supplied per depositor        |
//! | `TimelockController` | [`TimelockState`]           | role grants                             |
//! | `YieldSplitter`      | [`SplitterState`]           | fixed beneficiaries                     |
//! | `StudentSBT`         | [`SbtState`]                | one token per holder, voting power      |
//! | `MyGovernor`         | [`GovernorState`]           | immutable governance parameters         |
//! | `LosslessVault`      | [`VaultState`]              | share ledger and principal              |
//! | `UniversityRegistry` | [`UniversityRegistryState`] | id → (name, wallet, locked)             |
//! | `DonationTracker`    | [`TrackerState`]            | per-university aggregates               |
//! | `StudentRegistry`    | [`StudentRegistryState`]    | registered students                     |
//!
//! Contract storage is cloned wholesale before every transaction and restored
//! on revert, so entry points may mutate freely before failing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::types::{Address, ContractKind, Role, StudentEntry, UniversityEntry};
use crate::Error;

/// `a + b`, reverting with [`Error::Overflow`] instead of wrapping.
pub fn checked_add(a: u128, b: u128) -> Result<u128, Error> {
    a.checked_add(b).ok_or(Error::Overflow)
}

/// Add `amount` to the `u128` stored under `key`.
pub fn credit_entry<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, u128>,
    key: K,
    amount: u128,
) -> Result<(), Error> {
    let entry = map.entry(key).or_insert(0);
    *entry = checked_add(*entry, amount)?;
    Ok(())
}

#[derive(Clone, Debug, Default)]
pub struct TokenState {
    pub owner: Address,
    pub total_supply: u128,
    pub balances: HashMap<Address, u128>,
    pub allowances: HashMap<(Address, Address), u128>,
    pub minters: BTreeSet<Address>,
}

impl TokenState {
    pub fn balance_of(&self, who: &Address) -> u128 {
        self.balances.get(who).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    pub fn credit(&mut self, who: Address, amount: u128) -> Result<(), Error> {
        credit_entry(&mut self.balances, who, amount)
    }

    pub fn debit(&mut self, who: Address, amount: u128) -> Result<(), Error> {
        let balance = self.balances.entry(who).or_insert(0);
        if *balance < amount {
            return Err(Error::InsufficientBalance);
        }
        *balance -= amount;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PoolState {
    pub owner: Address,
    pub asset: Address,
    pub principal: u128,
    pub supplied: HashMap<Address, u128>,
}

#[derive(Clone, Debug, Default)]
pub struct TimelockState {
    pub min_delay: u64,
    pub roles: BTreeSet<(RoleKey, Address)>,
}

/// Orderable mirror of [`Role`] for set storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RoleKey {
    Admin,
    Proposer,
    Executor,
    Canceller,
}

impl From<Role> for RoleKey {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => RoleKey::Admin,
            Role::Proposer => RoleKey::Proposer,
            Role::Executor => RoleKey::Executor,
            Role::Canceller => RoleKey::Canceller,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SplitterState {
    pub asset: Address,
    pub university_wallet: Address,
    pub timelock: Address,
    pub total_split: u128,
}

#[derive(Clone, Debug, Default)]
pub struct SbtState {
    pub owner: Address,
    pub name: String,
    pub symbol: String,
    pub next_token_id: u64,
    /// holder → (token id, voting power in tenths)
    pub holders: HashMap<Address, (u64, u32)>,
    pub authorized_minters: BTreeSet<Address>,
}

#[derive(Clone, Debug, Default)]
pub struct GovernorState {
    pub token: Address,
    pub timelock: Address,
    pub voting_delay: u64,
    pub voting_period: u64,
    pub quorum_percentage: u64,
}

#[derive(Clone, Debug, Default)]
pub struct VaultState {
    pub asset: Address,
    pub name: String,
    pub symbol: String,
    pub pool: Address,
    pub splitter: Address,
    pub total_shares: u128,
    pub shares: HashMap<Address, u128>,
    pub total_principal: u128,
    pub total_harvested: u128,
}

impl VaultState {
    pub fn shares_of(&self, who: &Address) -> u128 {
        self.shares.get(who).copied().unwrap_or(0)
    }

    /// Shares minted for `assets`, rounding down.
    pub fn convert_to_shares(&self, assets: u128) -> Result<u128, Error> {
        if self.total_shares == 0 || self.total_principal == 0 {
            Ok(assets)
        } else {
            Ok(assets.checked_mul(self.total_shares).ok_or(Error::Overflow)? / self.total_principal)
        }
    }

    /// Assets redeemable for `shares`, rounding down.
    pub fn convert_to_assets(&self, shares: u128) -> Result<u128, Error> {
        if self.total_shares == 0 {
            Ok(shares)
        } else {
            Ok(shares.checked_mul(self.total_principal).ok_or(Error::Overflow)? / self.total_shares)
        }
    }

    /// Shares burned to withdraw `assets`, rounding up.
    pub fn preview_withdraw(&self, assets: u128) -> Result<u128, Error> {
        if self.total_shares == 0 || self.total_principal == 0 {
            Ok(assets)
        } else {
            Ok(assets
                .checked_mul(self.total_shares)
                .ok_or(Error::Overflow)?
                .div_ceil(self.total_principal))
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UniversityRegistryState {
    pub owner: Address,
    pub universities: BTreeMap<String, UniversityEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct TrackerState {
    pub owner: Address,
    pub universities: BTreeMap<Address, String>,
    pub donations: HashMap<Address, u128>,
    pub yield_distributed: HashMap<Address, u128>,
}

#[derive(Clone, Debug, Default)]
pub struct StudentRegistryState {
    pub owner: Address,
    pub sbt: Option<Address>,
    pub students: HashMap<Address, StudentEntry>,
}

/// Storage of one deployed contract.
#[derive(Clone, Debug)]
pub enum ContractState {
    Token(TokenState),
    Pool(PoolState),
    Timelock(TimelockState),
    Splitter(SplitterState),
    Sbt(SbtState),
    Governor(GovernorState),
    Vault(VaultState),
    UniversityRegistry(UniversityRegistryState),
    Tracker(TrackerState),
    StudentRegistry(StudentRegistryState),
}

impl ContractState {
    pub fn kind(&self) -> ContractKind {
        match self {
            Self::Token(_) => ContractKind::MockUsdc,
            Self::Pool(_) => ContractKind::MockAavePool,
            Self::Timelock(_) => ContractKind::TimelockController,
            Self::Splitter(_) => ContractKind::YieldSplitter,
            Self::Sbt(_) => ContractKind::StudentSbt,
            Self::Governor(_) => ContractKind::MyGovernor,
            Self::Vault(_) => ContractKind::LosslessVault,
            Self::UniversityRegistry(_) => ContractKind::UniversityRegistry,
            Self::Tracker(_) => ContractKind::DonationTracker,
            Self::StudentRegistry(_) => ContractKind::StudentRegistry,
        }
    }
}

pub type Contracts = HashMap<Address, ContractState>;

macro_rules! accessors {
    ($( $get:ident, $get_mut:ident, $variant:ident, $state:ty, $kind:ident; )*) => {
        $(
            pub fn $get<'a>(contracts: &'a Contracts, at: &Address) -> Result<&'a $state, Error> {
                match contracts.get(at) {
                    Some(ContractState::$variant(state)) => Ok(state),
                    Some(other) => Err(Error::WrongContract {
                        expected: ContractKind::$kind,
                        found: other.kind(),
                    }),
                    None => Err(Error::UnknownContract),
                }
            }

            #[allow(dead_code)]
            pub fn $get_mut<'a>(
                contracts: &'a mut Contracts,
                at: &Address,
            ) -> Result<&'a mut $state, Error> {
                match contracts.get_mut(at) {
                    Some(ContractState::$variant(state)) => Ok(state),
                    Some(other) => Err(Error::WrongContract {
                        expected: ContractKind::$kind,
                        found: other.kind(),
                    }),
                    None => Err(Error::UnknownContract),
                }
            }
        )*
    };
}

accessors! {
    token, token_mut, Token, TokenState, MockUsdc;
    pool, pool_mut, Pool, PoolState, MockAavePool;
    timelock, timelock_mut, Timelock, TimelockState, TimelockController;
    splitter, splitter_mut, Splitter, SplitterState, YieldSplitter;
    sbt, sbt_mut, Sbt, SbtState, StudentSbt;
    governor, governor_mut, Governor, GovernorState, MyGovernor;
    vault, vault_mut, Vault, VaultState, LosslessVault;
    university_registry, university_registry_mut, UniversityRegistry, UniversityRegistryState, UniversityRegistry;
    tracker, tracker_mut, Tracker, TrackerState, DonationTracker;
    student_registry, student_registry_mut, StudentRegistry, StudentRegistryState, StudentRegistry;
}
