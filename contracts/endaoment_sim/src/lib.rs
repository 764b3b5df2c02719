//! # EnDAOment contract suite, in process
//!
//! A deterministic, auto-mining ledger that executes the EnDAOment contracts
//! without a node. Donors deposit stablecoin into a lossless vault, the vault
//! supplies the principal to a mock lending pool, harvested yield is split
//! 50/50 between a university treasury and the DAO timelock, and registered
//! students receive a soulbound voting token.
//!
//! | Contract             | Entry point(s)                                                         |
//! |----------------------|------------------------------------------------------------------------|
//! | Bootstrap            | [`Ledger::new`], [`Ledger::deploy`]                                    |
//! | `MockUSDC`           | `mint`, `add_minter`, `faucet`, `transfer`, `approve`                  |
//! | `MockAavePool`       | `admin_add_yield`                                                      |
//! | `TimelockController` | `grant_role`                                                           |
//! | `StudentSBT`         | `add_authorized_minter`, `transfer_sbt` (always reverts)               |
//! | `LosslessVault`      | `deposit`, `withdraw`, `harvest_yield`                                 |
//! | `UniversityRegistry` | `register_university`, `lock_university_wallet`, `set_university_wallet` |
//! | `DonationTracker`    | `tracker_register_university`, `record_donation`, `record_yield`       |
//! | `StudentRegistry`    | `set_student_sbt`, `register_student`                                  |
//!
//! Reads never mine. Writes mine one block each and are atomic: contract
//! storage is restored when an entry point returns an [`Error`].

mod storage;
mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_governance;
#[cfg(test)]
mod test_registries;
#[cfg(test)]
mod test_vault;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use storage::{
    checked_add, credit_entry, governor, pool, pool_mut, sbt, sbt_mut, splitter, splitter_mut, student_registry,
    student_registry_mut, timelock, timelock_mut, token, token_mut, tracker, tracker_mut,
    university_registry, university_registry_mut, vault, vault_mut, ContractState, Contracts,
    GovernorState, PoolState, RoleKey, SbtState, SplitterState, StudentRegistryState,
    TimelockState, TokenState, TrackerState, UniversityRegistryState, VaultState,
};
pub use types::{
    Address, Constructor, ContractKind, Event, ParseAddressError, Receipt, Role, StudentEntry,
    UniversityEntry,
};

/// Stablecoin decimals.
pub const USDC_DECIMALS: u32 = 6;

/// Amount minted by `faucet()`: 10,000 USDC.
pub const FAUCET_AMOUNT: u128 = 10_000 * 10u128.pow(USDC_DECIMALS);

/// Number of pre-funded signer accounts, like a local development node.
pub const SIGNER_COUNT: usize = 10;

/// Voting power ceiling in tenths (4 votes).
pub const MAX_VOTING_POWER_TENTHS: u32 = 40;

const BASE_GAS: u64 = 21_000;
const GAS_PER_LOG: u64 = 9_000;

/// Revert reasons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Ownable: caller is not the owner")]
    NotOwner,
    #[error("caller is not a minter")]
    NotMinter,
    #[error("ERC20: transfer amount exceeds balance")]
    InsufficientBalance,
    #[error("ERC20: insufficient allowance")]
    InsufficientAllowance,
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("no contract deployed at address")]
    UnknownContract,
    #[error("expected a {expected:?} contract, found {found:?}")]
    WrongContract {
        expected: ContractKind,
        found: ContractKind,
    },
    #[error("AccessControl: account is missing role")]
    MissingRole,
    #[error("no yield available to harvest")]
    NoYieldAvailable,
    #[error("ERC4626: withdraw more than max")]
    InsufficientShares,
    #[error("already registered")]
    AlreadyRegistered,
    #[error("not registered")]
    NotRegistered,
    #[error("university wallet is locked")]
    WalletLocked,
    #[error("address already holds a soulbound token")]
    AlreadyHasSbt,
    #[error("soulbound tokens are non-transferable")]
    Soulbound,
    #[error("caller is not an authorized minter")]
    NotAuthorizedMinter,
    #[error("required field is empty")]
    EmptyField,
    #[error("zero address")]
    ZeroAddress,
    #[error("caller does not own the shares")]
    NotShareOwner,
    #[error("arithmetic overflow")]
    Overflow,
}

impl Error {
    /// Stable numeric revert code.
    pub fn code(&self) -> u32 {
        match self {
            Self::NotOwner => 1,
            Self::NotMinter => 2,
            Self::InsufficientBalance => 3,
            Self::InsufficientAllowance => 4,
            Self::ZeroAmount => 5,
            Self::UnknownContract => 6,
            Self::WrongContract { .. } => 7,
            Self::MissingRole => 8,
            Self::NoYieldAvailable => 9,
            Self::InsufficientShares => 10,
            Self::AlreadyRegistered => 11,
            Self::NotRegistered => 12,
            Self::WalletLocked => 13,
            Self::AlreadyHasSbt => 14,
            Self::Soulbound => 15,
            Self::NotAuthorizedMinter => 16,
            Self::EmptyField => 17,
            Self::ZeroAddress => 18,
            Self::NotShareOwner => 19,
            Self::Overflow => 20,
        }
    }
}

/// Voting power in tenths: base 10 plus one per achievement, capped at 40.
pub fn voting_power_tenths(academic: u32, sports: u32, student: u32) -> u32 {
    10u32
        .saturating_add(academic)
        .saturating_add(sports)
        .saturating_add(student)
        .min(MAX_VOTING_POWER_TENTHS)
}

/// Governance parameters stored by `MyGovernor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GovernorSettings {
    pub token: Address,
    pub timelock: Address,
    pub voting_delay: u64,
    pub voting_period: u64,
    pub quorum_percentage: u64,
}

pub struct Ledger {
    contracts: Contracts,
    accounts: Vec<Address>,
    account_nonce: u64,
    contract_nonce: u64,
    block_number: u64,
    tx_count: u64,
    logs: Vec<(Address, Event)>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        let mut ledger = Ledger {
            contracts: HashMap::new(),
            accounts: Vec::with_capacity(SIGNER_COUNT),
            account_nonce: 0,
            contract_nonce: 0,
            block_number: 0,
            tx_count: 0,
            logs: Vec::new(),
        };
        for _ in 0..SIGNER_COUNT {
            let account = ledger.generate_account();
            ledger.accounts.push(account);
        }
        ledger
    }

    /// The pre-generated signer accounts; index 0 is the deployer.
    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    /// Hand out a fresh externally-owned address.
    pub fn generate_account(&mut self) -> Address {
        self.account_nonce += 1;
        Address::derive_account(self.account_nonce)
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn kind_of(&self, at: &Address) -> Option<ContractKind> {
        self.contracts.get(at).map(ContractState::kind)
    }

    // ─────────────────────────────────────────────────────────
    // Transaction plumbing
    // ─────────────────────────────────────────────────────────

    fn transact<T>(
        &mut self,
        from: Address,
        to: Option<Address>,
        body: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<(Receipt, T), Error> {
        let snapshot = self.contracts.clone();
        let contract_nonce = self.contract_nonce;
        self.logs.clear();

        match body(self) {
            Ok(value) => {
                self.block_number += 1;
                self.tx_count += 1;
                let logs = std::mem::take(&mut self.logs);
                let mut transaction_hash = [0u8; 32];
                transaction_hash[0] = 0x7e;
                transaction_hash[24..].copy_from_slice(&self.tx_count.to_be_bytes());
                let receipt = Receipt {
                    transaction_hash,
                    block_number: self.block_number,
                    from,
                    to,
                    contract_address: None,
                    gas_used: BASE_GAS + GAS_PER_LOG * logs.len() as u64,
                    logs,
                };
                Ok((receipt, value))
            }
            Err(err) => {
                self.contracts = snapshot;
                self.contract_nonce = contract_nonce;
                self.logs.clear();
                Err(err)
            }
        }
    }

    fn write(
        &mut self,
        from: Address,
        to: Address,
        body: impl FnOnce(&mut Self) -> Result<(), Error>,
    ) -> Result<Receipt, Error> {
        self.transact(from, Some(to), body).map(|(receipt, ())| receipt)
    }

    fn emit(&mut self, at: Address, event: Event) {
        self.logs.push((at, event));
    }

    // ─────────────────────────────────────────────────────────
    // Deployment
    // ─────────────────────────────────────────────────────────

    /// Deploy a contract; `from` becomes its owner where ownership applies.
    pub fn deploy(&mut self, from: Address, constructor: Constructor) -> Result<Receipt, Error> {
        let (mut receipt, address) = self.transact(from, None, |ledger| {
            ledger.contract_nonce += 1;
            let address = Address::derive_contract(ledger.contract_nonce);
            let state = ledger.construct(from, address, constructor)?;
            ledger.contracts.insert(address, state);
            Ok(address)
        })?;
        receipt.contract_address = Some(address);
        Ok(receipt)
    }

    fn construct(
        &mut self,
        from: Address,
        address: Address,
        constructor: Constructor,
    ) -> Result<ContractState, Error> {
        let state = match constructor {
            Constructor::MockUsdc => ContractState::Token(TokenState {
                owner: from,
                ..TokenState::default()
            }),
            Constructor::MockAavePool { asset } => {
                token(&self.contracts, &asset)?;
                ContractState::Pool(PoolState {
                    owner: from,
                    asset,
                    ..PoolState::default()
                })
            }
            Constructor::TimelockController {
                min_delay,
                proposers,
                executors,
                cancellers,
            } => {
                let mut roles = BTreeSet::new();
                roles.insert((RoleKey::Admin, from));
                roles.insert((RoleKey::Admin, address));
                for p in proposers {
                    roles.insert((RoleKey::Proposer, p));
                    roles.insert((RoleKey::Canceller, p));
                }
                for e in executors {
                    roles.insert((RoleKey::Executor, e));
                }
                for c in cancellers {
                    roles.insert((RoleKey::Canceller, c));
                }
                ContractState::Timelock(TimelockState { min_delay, roles })
            }
            Constructor::YieldSplitter {
                asset,
                university_wallet,
                timelock: timelock_address,
            } => {
                if university_wallet.is_zero() || timelock_address.is_zero() {
                    return Err(Error::ZeroAddress);
                }
                token(&self.contracts, &asset)?;
                ContractState::Splitter(SplitterState {
                    asset,
                    university_wallet,
                    timelock: timelock_address,
                    total_split: 0,
                })
            }
            Constructor::StudentSbt { name, symbol } => ContractState::Sbt(SbtState {
                owner: from,
                name,
                symbol,
                ..SbtState::default()
            }),
            Constructor::MyGovernor {
                token: voting_token,
                timelock: timelock_address,
                voting_delay,
                voting_period,
                quorum_percentage,
            } => {
                sbt(&self.contracts, &voting_token)?;
                timelock(&self.contracts, &timelock_address)?;
                ContractState::Governor(GovernorState {
                    token: voting_token,
                    timelock: timelock_address,
                    voting_delay,
                    voting_period,
                    quorum_percentage,
                })
            }
            Constructor::LosslessVault {
                asset,
                name,
                symbol,
                pool: pool_address,
                splitter: splitter_address,
            } => {
                token(&self.contracts, &asset)?;
                pool(&self.contracts, &pool_address)?;
                splitter(&self.contracts, &splitter_address)?;
                ContractState::Vault(VaultState {
                    asset,
                    name,
                    symbol,
                    pool: pool_address,
                    splitter: splitter_address,
                    ..VaultState::default()
                })
            }
            Constructor::UniversityRegistry => {
                ContractState::UniversityRegistry(UniversityRegistryState {
                    owner: from,
                    universities: BTreeMap::new(),
                })
            }
            Constructor::DonationTracker => ContractState::Tracker(TrackerState {
                owner: from,
                ..TrackerState::default()
            }),
            Constructor::StudentRegistry => {
                ContractState::StudentRegistry(StudentRegistryState {
                    owner: from,
                    ..StudentRegistryState::default()
                })
            }
        };
        Ok(state)
    }

    // ─────────────────────────────────────────────────────────
    // MockUSDC
    // ─────────────────────────────────────────────────────────

    fn mint_tokens(&mut self, at: Address, to: Address, amount: u128) -> Result<(), Error> {
        if to.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let state = token_mut(&mut self.contracts, &at)?;
        state.total_supply = checked_add(state.total_supply, amount)?;
        state.credit(to, amount)?;
        self.emit(at, Event::Transfer { from: Address::ZERO, to, value: amount });
        Ok(())
    }

    fn move_tokens(
        &mut self,
        at: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), Error> {
        if to.is_zero() {
            return Err(Error::ZeroAddress);
        }
        let state = token_mut(&mut self.contracts, &at)?;
        state.debit(from, amount)?;
        state.credit(to, amount)?;
        self.emit(at, Event::Transfer { from, to, value: amount });
        Ok(())
    }

    fn spend_allowance(
        &mut self,
        at: Address,
        owner: Address,
        spender: Address,
        amount: u128,
    ) -> Result<(), Error> {
        let state = token_mut(&mut self.contracts, &at)?;
        let current = state.allowance(&owner, &spender);
        if current < amount {
            return Err(Error::InsufficientAllowance);
        }
        state.allowances.insert((owner, spender), current - amount);
        Ok(())
    }

    /// Mint stablecoin; the caller must be the owner or a registered minter.
    pub fn mint(
        &mut self,
        from: Address,
        at: Address,
        to: Address,
        amount: u128,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = token(&ledger.contracts, &at)?;
            if state.owner != from && !state.minters.contains(&from) {
                return Err(Error::NotMinter);
            }
            ledger.mint_tokens(at, to, amount)
        })
    }

    pub fn add_minter(&mut self, from: Address, at: Address, minter: Address) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = token_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            state.minters.insert(minter);
            ledger.emit(at, Event::MinterAdded { minter });
            Ok(())
        })
    }

    /// Mint [`FAUCET_AMOUNT`] to the caller. Open to anyone.
    pub fn faucet(&mut self, from: Address, at: Address) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| ledger.mint_tokens(at, from, FAUCET_AMOUNT))
    }

    pub fn transfer(
        &mut self,
        from: Address,
        at: Address,
        to: Address,
        amount: u128,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| ledger.move_tokens(at, from, to, amount))
    }

    pub fn approve(
        &mut self,
        from: Address,
        at: Address,
        spender: Address,
        amount: u128,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if spender.is_zero() {
                return Err(Error::ZeroAddress);
            }
            token_mut(&mut ledger.contracts, &at)?
                .allowances
                .insert((from, spender), amount);
            ledger.emit(at, Event::Approval { owner: from, spender, value: amount });
            Ok(())
        })
    }

    pub fn balance_of(&self, at: Address, who: Address) -> Result<u128, Error> {
        Ok(token(&self.contracts, &at)?.balance_of(&who))
    }

    pub fn allowance(&self, at: Address, owner: Address, spender: Address) -> Result<u128, Error> {
        Ok(token(&self.contracts, &at)?.allowance(&owner, &spender))
    }

    pub fn total_supply(&self, at: Address) -> Result<u128, Error> {
        Ok(token(&self.contracts, &at)?.total_supply)
    }

    pub fn token_owner(&self, at: Address) -> Result<Address, Error> {
        Ok(token(&self.contracts, &at)?.owner)
    }

    pub fn is_minter(&self, at: Address, who: Address) -> Result<bool, Error> {
        Ok(token(&self.contracts, &at)?.minters.contains(&who))
    }

    // ─────────────────────────────────────────────────────────
    // MockAavePool
    // ─────────────────────────────────────────────────────────

    /// Simulate interest: mint `amount` of the pool asset into the pool.
    pub fn admin_add_yield(&mut self, from: Address, at: Address, amount: u128) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if amount == 0 {
                return Err(Error::ZeroAmount);
            }
            let state = pool(&ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            let asset = state.asset;
            if !token(&ledger.contracts, &asset)?.minters.contains(&at) {
                return Err(Error::NotMinter);
            }
            ledger.mint_tokens(asset, at, amount)?;
            ledger.emit(at, Event::YieldAdded { amount });
            Ok(())
        })
    }

    /// Principal supplied by all depositors (`totalSupply` on the pool).
    pub fn pool_principal(&self, at: Address) -> Result<u128, Error> {
        Ok(pool(&self.contracts, &at)?.principal)
    }

    /// Pool asset balance (`getTotalAssets`).
    pub fn pool_total_assets(&self, at: Address) -> Result<u128, Error> {
        let state = pool(&self.contracts, &at)?;
        Ok(token(&self.contracts, &state.asset)?.balance_of(&at))
    }

    /// Assets held above principal (`getAvailableYield`).
    pub fn available_yield(&self, at: Address) -> Result<u128, Error> {
        let principal = self.pool_principal(at)?;
        Ok(self.pool_total_assets(at)?.saturating_sub(principal))
    }

    // ─────────────────────────────────────────────────────────
    // TimelockController
    // ─────────────────────────────────────────────────────────

    pub fn grant_role(
        &mut self,
        from: Address,
        at: Address,
        role: Role,
        account: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = timelock_mut(&mut ledger.contracts, &at)?;
            if !state.roles.contains(&(RoleKey::Admin, from)) {
                return Err(Error::MissingRole);
            }
            state.roles.insert((role.into(), account));
            ledger.emit(at, Event::RoleGranted { role: format!("{role:?}"), account });
            Ok(())
        })
    }

    pub fn has_role(&self, at: Address, role: Role, account: Address) -> Result<bool, Error> {
        Ok(timelock(&self.contracts, &at)?
            .roles
            .contains(&(role.into(), account)))
    }

    pub fn min_delay(&self, at: Address) -> Result<u64, Error> {
        Ok(timelock(&self.contracts, &at)?.min_delay)
    }

    // ─────────────────────────────────────────────────────────
    // YieldSplitter
    // ─────────────────────────────────────────────────────────

    /// Pay out `amount` already held by the splitter: half to the university,
    /// the remainder to the timelock.
    fn split(&mut self, at: Address, amount: u128) -> Result<(), Error> {
        let state = splitter(&self.contracts, &at)?;
        let (asset, university_wallet, dao) = (state.asset, state.university_wallet, state.timelock);
        let university = amount / 2;
        let dao_share = amount - university;
        self.move_tokens(asset, at, university_wallet, university)?;
        self.move_tokens(asset, at, dao, dao_share)?;
        let state = splitter_mut(&mut self.contracts, &at)?;
        state.total_split = checked_add(state.total_split, amount)?;
        self.emit(at, Event::YieldSplit { university, dao: dao_share });
        Ok(())
    }

    pub fn splitter_university_wallet(&self, at: Address) -> Result<Address, Error> {
        Ok(splitter(&self.contracts, &at)?.university_wallet)
    }

    pub fn splitter_timelock(&self, at: Address) -> Result<Address, Error> {
        Ok(splitter(&self.contracts, &at)?.timelock)
    }

    pub fn splitter_total_split(&self, at: Address) -> Result<u128, Error> {
        Ok(splitter(&self.contracts, &at)?.total_split)
    }

    // ─────────────────────────────────────────────────────────
    // StudentSBT
    // ─────────────────────────────────────────────────────────

    pub fn add_authorized_minter(
        &mut self,
        from: Address,
        at: Address,
        minter: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = sbt_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            state.authorized_minters.insert(minter);
            ledger.emit(at, Event::AuthorizedMinterAdded { minter });
            Ok(())
        })
    }

    fn mint_sbt(&mut self, at: Address, minter: Address, to: Address, power: u32) -> Result<(), Error> {
        let state = sbt_mut(&mut self.contracts, &at)?;
        if state.owner != minter && !state.authorized_minters.contains(&minter) {
            return Err(Error::NotAuthorizedMinter);
        }
        if state.holders.contains_key(&to) {
            return Err(Error::AlreadyHasSbt);
        }
        let token_id = state.next_token_id;
        state.next_token_id += 1;
        state.holders.insert(to, (token_id, power));
        self.emit(at, Event::SbtMinted { to, token_id });
        Ok(())
    }

    /// Soulbound: every transfer attempt reverts.
    pub fn transfer_sbt(&mut self, from: Address, at: Address, _to: Address) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            sbt(&ledger.contracts, &at)?;
            Err(Error::Soulbound)
        })
    }

    pub fn has_sbt(&self, at: Address, who: Address) -> Result<bool, Error> {
        Ok(sbt(&self.contracts, &at)?.holders.contains_key(&who))
    }

    pub fn sbt_voting_power(&self, at: Address, who: Address) -> Result<u32, Error> {
        Ok(sbt(&self.contracts, &at)?
            .holders
            .get(&who)
            .map(|(_, power)| *power)
            .unwrap_or(0))
    }

    pub fn sbt_total_supply(&self, at: Address) -> Result<u64, Error> {
        Ok(sbt(&self.contracts, &at)?.holders.len() as u64)
    }

    pub fn is_authorized_minter(&self, at: Address, who: Address) -> Result<bool, Error> {
        Ok(sbt(&self.contracts, &at)?.authorized_minters.contains(&who))
    }

    // ─────────────────────────────────────────────────────────
    // MyGovernor
    // ─────────────────────────────────────────────────────────

    pub fn governor_settings(&self, at: Address) -> Result<GovernorSettings, Error> {
        let state = governor(&self.contracts, &at)?;
        Ok(GovernorSettings {
            token: state.token,
            timelock: state.timelock,
            voting_delay: state.voting_delay,
            voting_period: state.voting_period,
            quorum_percentage: state.quorum_percentage,
        })
    }

    /// Votes of `account` in tenths, read from the governor's voting token.
    pub fn get_votes(&self, at: Address, account: Address) -> Result<u32, Error> {
        let voting_token = governor(&self.contracts, &at)?.token;
        self.sbt_voting_power(voting_token, account)
    }

    // ─────────────────────────────────────────────────────────
    // LosslessVault
    // ─────────────────────────────────────────────────────────

    /// Pull `assets` from the caller, supply them to the pool and mint shares
    /// to `receiver`.
    pub fn deposit(
        &mut self,
        from: Address,
        at: Address,
        assets: u128,
        receiver: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if assets == 0 {
                return Err(Error::ZeroAmount);
            }
            if receiver.is_zero() {
                return Err(Error::ZeroAddress);
            }
            let state = vault(&ledger.contracts, &at)?;
            let (asset, pool_address) = (state.asset, state.pool);
            let shares = state.convert_to_shares(assets)?;

            ledger.spend_allowance(asset, from, at, assets)?;
            ledger.move_tokens(asset, from, at, assets)?;
            ledger.move_tokens(asset, at, pool_address, assets)?;

            let pool_state = pool_mut(&mut ledger.contracts, &pool_address)?;
            pool_state.principal = checked_add(pool_state.principal, assets)?;
            credit_entry(&mut pool_state.supplied, at, assets)?;

            let state = vault_mut(&mut ledger.contracts, &at)?;
            state.total_principal = checked_add(state.total_principal, assets)?;
            state.total_shares = checked_add(state.total_shares, shares)?;
            credit_entry(&mut state.shares, receiver, shares)?;

            ledger.emit(at, Event::Deposit { sender: from, owner: receiver, assets, shares });
            Ok(())
        })
    }

    /// Burn the owner's shares (rounded up) and pay `assets` of principal to
    /// `receiver`.
    pub fn withdraw(
        &mut self,
        from: Address,
        at: Address,
        assets: u128,
        receiver: Address,
        owner: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if assets == 0 {
                return Err(Error::ZeroAmount);
            }
            if from != owner {
                return Err(Error::NotShareOwner);
            }
            let state = vault(&ledger.contracts, &at)?;
            let (asset, pool_address) = (state.asset, state.pool);
            let shares = state.preview_withdraw(assets)?;
            if state.shares_of(&owner) < shares || state.total_principal < assets {
                return Err(Error::InsufficientShares);
            }

            let state = vault_mut(&mut ledger.contracts, &at)?;
            state.total_principal -= assets;
            state.total_shares -= shares;
            if let Some(held) = state.shares.get_mut(&owner) {
                *held -= shares;
            }

            let pool_state = pool_mut(&mut ledger.contracts, &pool_address)?;
            let supplied = pool_state.supplied.entry(at).or_insert(0);
            if *supplied < assets {
                return Err(Error::InsufficientBalance);
            }
            *supplied -= assets;
            pool_state.principal -= assets;
            ledger.move_tokens(asset, pool_address, receiver, assets)?;

            ledger.emit(at, Event::Withdraw { sender: from, receiver, owner, assets, shares });
            Ok(())
        })
    }

    /// Move the pool's available yield to the splitter and split it.
    pub fn harvest_yield(&mut self, from: Address, at: Address) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = vault(&ledger.contracts, &at)?;
            let (asset, pool_address, splitter_address) = (state.asset, state.pool, state.splitter);
            let amount = ledger.available_yield(pool_address)?;
            if amount == 0 {
                return Err(Error::NoYieldAvailable);
            }
            ledger.move_tokens(asset, pool_address, splitter_address, amount)?;
            ledger.split(splitter_address, amount)?;
            let state = vault_mut(&mut ledger.contracts, &at)?;
            state.total_harvested = checked_add(state.total_harvested, amount)?;
            ledger.emit(at, Event::YieldHarvested { amount });
            Ok(())
        })
    }

    pub fn vault_balance_of(&self, at: Address, who: Address) -> Result<u128, Error> {
        Ok(vault(&self.contracts, &at)?.shares_of(&who))
    }

    pub fn convert_to_assets(&self, at: Address, shares: u128) -> Result<u128, Error> {
        vault(&self.contracts, &at)?.convert_to_assets(shares)
    }

    pub fn convert_to_shares(&self, at: Address, assets: u128) -> Result<u128, Error> {
        vault(&self.contracts, &at)?.convert_to_shares(assets)
    }

    pub fn vault_total_assets(&self, at: Address) -> Result<u128, Error> {
        Ok(vault(&self.contracts, &at)?.total_principal)
    }

    pub fn vault_total_supply(&self, at: Address) -> Result<u128, Error> {
        Ok(vault(&self.contracts, &at)?.total_shares)
    }

    pub fn vault_total_harvested(&self, at: Address) -> Result<u128, Error> {
        Ok(vault(&self.contracts, &at)?.total_harvested)
    }

    // ─────────────────────────────────────────────────────────
    // UniversityRegistry
    // ─────────────────────────────────────────────────────────

    /// Register a university under a new, unique id. Open to any caller;
    /// wallet changes and locking stay with the owner.
    pub fn register_university(
        &mut self,
        from: Address,
        at: Address,
        id: &str,
        name: &str,
        wallet: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if id.is_empty() || name.is_empty() {
                return Err(Error::EmptyField);
            }
            if wallet.is_zero() {
                return Err(Error::ZeroAddress);
            }
            let state = university_registry_mut(&mut ledger.contracts, &at)?;
            if state.universities.contains_key(id) {
                return Err(Error::AlreadyRegistered);
            }
            state.universities.insert(
                id.to_string(),
                UniversityEntry {
                    id: id.to_string(),
                    name: name.to_string(),
                    wallet,
                    locked: false,
                },
            );
            ledger.emit(at, Event::UniversityRegistered { id: id.to_string(), wallet });
            Ok(())
        })
    }

    /// One-way: there is no unlock entry point.
    pub fn lock_university_wallet(&mut self, from: Address, at: Address, id: &str) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = university_registry_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            let entry = state.universities.get_mut(id).ok_or(Error::NotRegistered)?;
            entry.locked = true;
            ledger.emit(at, Event::UniversityWalletLocked { id: id.to_string() });
            Ok(())
        })
    }

    pub fn set_university_wallet(
        &mut self,
        from: Address,
        at: Address,
        id: &str,
        wallet: Address,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = university_registry_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            let entry = state.universities.get_mut(id).ok_or(Error::NotRegistered)?;
            if entry.locked {
                return Err(Error::WalletLocked);
            }
            entry.wallet = wallet;
            Ok(())
        })
    }

    pub fn is_university_registered(&self, at: Address, id: &str) -> Result<bool, Error> {
        Ok(university_registry(&self.contracts, &at)?
            .universities
            .contains_key(id))
    }

    pub fn university(&self, at: Address, id: &str) -> Result<Option<UniversityEntry>, Error> {
        Ok(university_registry(&self.contracts, &at)?
            .universities
            .get(id)
            .cloned())
    }

    pub fn university_count(&self, at: Address) -> Result<u64, Error> {
        Ok(university_registry(&self.contracts, &at)?.universities.len() as u64)
    }

    // ─────────────────────────────────────────────────────────
    // DonationTracker
    // ─────────────────────────────────────────────────────────

    pub fn tracker_register_university(
        &mut self,
        from: Address,
        at: Address,
        wallet: Address,
        name: &str,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = tracker_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            if wallet.is_zero() {
                return Err(Error::ZeroAddress);
            }
            if state.universities.contains_key(&wallet) {
                return Err(Error::AlreadyRegistered);
            }
            state.universities.insert(wallet, name.to_string());
            Ok(())
        })
    }

    pub fn record_donation(
        &mut self,
        from: Address,
        at: Address,
        university: Address,
        amount: u128,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = tracker_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            if !state.universities.contains_key(&university) {
                return Err(Error::NotRegistered);
            }
            credit_entry(&mut state.donations, university, amount)?;
            ledger.emit(at, Event::DonationRecorded { university, amount });
            Ok(())
        })
    }

    pub fn record_yield(
        &mut self,
        from: Address,
        at: Address,
        university: Address,
        amount: u128,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            let state = tracker_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            if !state.universities.contains_key(&university) {
                return Err(Error::NotRegistered);
            }
            credit_entry(&mut state.yield_distributed, university, amount)?;
            Ok(())
        })
    }

    pub fn total_donations(&self, at: Address, university: Address) -> Result<u128, Error> {
        Ok(tracker(&self.contracts, &at)?
            .donations
            .get(&university)
            .copied()
            .unwrap_or(0))
    }

    pub fn total_yield_distributed(&self, at: Address, university: Address) -> Result<u128, Error> {
        Ok(tracker(&self.contracts, &at)?
            .yield_distributed
            .get(&university)
            .copied()
            .unwrap_or(0))
    }

    pub fn is_tracked_university(&self, at: Address, wallet: Address) -> Result<bool, Error> {
        Ok(tracker(&self.contracts, &at)?.universities.contains_key(&wallet))
    }

    // ─────────────────────────────────────────────────────────
    // StudentRegistry
    // ─────────────────────────────────────────────────────────

    pub fn set_student_sbt(&mut self, from: Address, at: Address, sbt_address: Address) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            sbt(&ledger.contracts, &sbt_address)?;
            let state = student_registry_mut(&mut ledger.contracts, &at)?;
            if state.owner != from {
                return Err(Error::NotOwner);
            }
            state.sbt = Some(sbt_address);
            Ok(())
        })
    }

    /// Register the caller as a student. When the registry knows its SBT the
    /// caller is minted a soulbound token carrying its voting power.
    #[allow(clippy::too_many_arguments)]
    pub fn register_student(
        &mut self,
        from: Address,
        at: Address,
        name: &str,
        university: &str,
        research_area: &str,
        student_id: &str,
        academic_achievements: u32,
        sports_achievements: u32,
        student_achievements: u32,
    ) -> Result<Receipt, Error> {
        self.write(from, at, |ledger| {
            if [name, university, research_area, student_id]
                .iter()
                .any(|field| field.trim().is_empty())
            {
                return Err(Error::EmptyField);
            }
            let state = student_registry(&ledger.contracts, &at)?;
            if state.students.contains_key(&from) {
                return Err(Error::AlreadyRegistered);
            }
            let sbt_address = state.sbt;
            let power = voting_power_tenths(
                academic_achievements,
                sports_achievements,
                student_achievements,
            );

            if let Some(sbt_address) = sbt_address {
                ledger.mint_sbt(sbt_address, at, from, power)?;
            }

            student_registry_mut(&mut ledger.contracts, &at)?.students.insert(
                from,
                StudentEntry {
                    name: name.to_string(),
                    university: university.to_string(),
                    research_area: research_area.to_string(),
                    student_id: student_id.to_string(),
                    academic_achievements,
                    sports_achievements,
                    student_achievements,
                    voting_power_tenths: power,
                },
            );
            ledger.emit(at, Event::StudentRegistered { student: from, voting_power_tenths: power });
            Ok(())
        })
    }

    pub fn is_student_registered(&self, at: Address, who: Address) -> Result<bool, Error> {
        Ok(student_registry(&self.contracts, &at)?.students.contains_key(&who))
    }

    pub fn student(&self, at: Address, who: Address) -> Result<Option<StudentEntry>, Error> {
        Ok(student_registry(&self.contracts, &at)?.students.get(&who).cloned())
    }

    pub fn student_registry_sbt(&self, at: Address) -> Result<Option<Address>, Error> {
        Ok(student_registry(&self.contracts, &at)?.sbt)
    }
}
