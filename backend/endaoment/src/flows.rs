//! Client transaction flows.
//!
//! Each user action (donate, withdraw, harvest, register, ...) runs through a
//! [`TransactionFlow`]: a small state machine that publishes its state on a
//! watch channel so a front end can render progress. Validation happens before
//! anything is submitted and leaves the state untouched; a failed read or
//! transaction moves the flow to `Error` with the underlying message verbatim.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::abi::Address;
use crate::chain::{Chain, TxReceipt};
use crate::contracts::ContractRegistry;
use crate::errors::{EndaomentError, Result, ValidationError};
use crate::format;
use crate::student::StudentProfile;
use crate::universities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxState {
    Idle,
    CheckingAllowance,
    Approving,
    Depositing,
    Withdrawing,
    Harvesting,
    Splitting,
    Registering,
    Success,
    Error,
}

impl TxState {
    pub fn message(&self) -> &'static str {
        match self {
            TxState::Idle => "Ready",
            TxState::CheckingAllowance => "Checking allowance...",
            TxState::Approving => "Approving USDC...",
            TxState::Depositing => "Depositing to vault...",
            TxState::Withdrawing => "Withdrawing from vault...",
            TxState::Harvesting => "Harvesting yield...",
            TxState::Splitting => "Splitting yield...",
            TxState::Registering => "Registering...",
            TxState::Success => "Transaction successful!",
            TxState::Error => "Transaction failed",
        }
    }

    /// A transaction or read is in flight.
    pub fn is_loading(&self) -> bool {
        !matches!(self, TxState::Idle | TxState::Success | TxState::Error)
    }

    pub fn is_final(&self) -> bool {
        matches!(self, TxState::Success | TxState::Error)
    }

    fn can_move_to(self, next: TxState) -> bool {
        use TxState::*;

        match (self, next) {
            (Idle, CheckingAllowance | Approving | Depositing | Withdrawing | Harvesting | Registering) => true,
            (CheckingAllowance, Approving | Depositing) => true,
            (Approving, Depositing) => true,
            (Harvesting, Splitting) => true,
            (from, Success) => from.is_loading(),
            (from, Error) => !from.is_final(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

// ─────────────────────────────────────────────────────────
// Flow instance
// ─────────────────────────────────────────────────────────

pub struct TransactionFlow {
    state: watch::Sender<TxState>,
    error: Option<String>,
    tx_hashes: Vec<String>,
    history: Vec<TxState>,
}

impl Default for TransactionFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionFlow {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TxState::Idle);
        TransactionFlow {
            state,
            error: None,
            tx_hashes: Vec::new(),
            history: vec![TxState::Idle],
        }
    }

    pub fn state(&self) -> TxState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TxState> {
        self.state.subscribe()
    }

    /// Message of the last failure, validation or on-chain.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Hashes of the transactions confirmed in this run.
    pub fn tx_hashes(&self) -> &[String] {
        &self.tx_hashes
    }

    /// States visited since the last reset.
    pub fn history(&self) -> &[TxState] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.state.send_replace(TxState::Idle);
        self.error = None;
        self.tx_hashes.clear();
        self.history = vec![TxState::Idle];
    }

    /// Start a new run. Only one run may be in flight per flow.
    pub fn begin(&mut self) -> Result<()> {
        let current = self.state();
        if current.is_loading() {
            return Err(EndaomentError::InvalidTransition(format!(
                "a transaction is already in flight ({current:?})"
            )));
        }
        self.reset();
        Ok(())
    }

    fn transition(&mut self, next: TxState) -> Result<()> {
        let current = self.state();
        if !current.can_move_to(next) {
            return Err(EndaomentError::InvalidTransition(format!("{current:?} -> {next:?}")));
        }
        debug!("Flow {current:?} -> {next:?}");
        self.state.send_replace(next);
        self.history.push(next);
        Ok(())
    }

    /// Surface a validation failure. The state does not change.
    fn reject(&mut self, error: ValidationError) -> EndaomentError {
        self.error = Some(error.to_string());
        error.into()
    }

    fn fail(&mut self, error: EndaomentError) -> EndaomentError {
        warn!("Transaction failed: {error}");
        self.error = Some(error.to_string());
        if self.state().can_move_to(TxState::Error) {
            self.state.send_replace(TxState::Error);
            self.history.push(TxState::Error);
        }
        error
    }

    fn succeed(&mut self) -> Result<()> {
        self.transition(TxState::Success)?;
        info!("{}", TxState::Success.message());
        Ok(())
    }

    /// Await a read. Failures end the run.
    async fn read<T>(&mut self, pending: impl Future<Output = Result<T>>) -> Result<T> {
        pending.await.map_err(|e| self.fail(e))
    }

    /// Enter `state`, then await the transaction's confirmation.
    async fn submit(
        &mut self,
        state: TxState,
        pending: impl Future<Output = Result<TxReceipt>>,
    ) -> Result<TxReceipt> {
        self.transition(state)?;
        let receipt = pending.await.map_err(|e| self.fail(e))?;
        info!(
            "{} confirmed: tx {} in block {}",
            state.message(),
            receipt.transaction_hash,
            receipt.block_number
        );
        self.tx_hashes.push(receipt.transaction_hash.clone());
        Ok(receipt)
    }
}

// ─────────────────────────────────────────────────────────
// Flows
// ─────────────────────────────────────────────────────────

pub struct FlowContext {
    pub chain: Arc<dyn Chain>,
    pub contracts: ContractRegistry,
}

fn connected(flow: &mut TransactionFlow, account: Option<Address>) -> Result<Address> {
    account.ok_or_else(|| flow.reject(ValidationError::WalletNotConnected))
}

/// Deposit `amount` USDC into the vault on behalf of `university`. The
/// approval step only runs when the current allowance is short.
pub async fn donate(
    ctx: &FlowContext,
    flow: &mut TransactionFlow,
    account: Option<Address>,
    university: Option<&str>,
    amount: &str,
) -> Result<()> {
    flow.begin()?;
    let donor = connected(flow, account)?;
    let university = university
        .filter(|id| !id.is_empty())
        .ok_or_else(|| flow.reject(ValidationError::UniversityNotSelected))?;
    let university = universities::by_id(university)
        .ok_or_else(|| flow.reject(ValidationError::UnknownUniversity(university.to_string())))?;
    let amount = format::parse_usdc(amount).map_err(|e| flow.reject(e))?;

    let stablecoin = ctx.contracts.stablecoin(&ctx.chain)?;
    let vault = ctx.contracts.vault(&ctx.chain)?;

    let balance = flow.read(stablecoin.balance_of(donor)).await?;
    format::validate_donation(amount, balance).map_err(|e| flow.reject(e))?;

    flow.transition(TxState::CheckingAllowance)?;
    let allowance = flow.read(stablecoin.allowance(donor, vault.address)).await?;
    if allowance < amount {
        flow.submit(TxState::Approving, stablecoin.approve(donor, vault.address, amount))
            .await?;
    } else {
        debug!("Allowance {allowance} covers {amount}, skipping approval");
    }
    flow.submit(TxState::Depositing, vault.deposit(donor, amount, donor))
        .await?;

    info!(
        "Donated {} USDC for {}",
        format::format_usdc_with_commas(amount),
        university.name
    );
    flow.succeed()
}

/// Withdraw `amount` of principal, or everything the donor's shares are worth.
pub async fn withdraw(
    ctx: &FlowContext,
    flow: &mut TransactionFlow,
    account: Option<Address>,
    amount: Option<&str>,
) -> Result<()> {
    flow.begin()?;
    let donor = connected(flow, account)?;
    let vault = ctx.contracts.vault(&ctx.chain)?;

    let shares = flow.read(vault.balance_of(donor)).await?;
    let available = flow.read(vault.convert_to_assets(shares)).await?;
    let amount = match amount.filter(|a| !a.trim().is_empty()) {
        Some(raw) => format::parse_usdc(raw).map_err(|e| flow.reject(e))?,
        None => available,
    };
    format::validate_donation(amount, available).map_err(|e| flow.reject(e))?;

    flow.submit(TxState::Withdrawing, vault.withdraw(donor, amount, donor, donor))
        .await?;
    info!("Withdrew {} USDC", format::format_usdc_with_commas(amount));
    flow.succeed()
}

/// Pool owner tops up the yield pool.
pub async fn add_yield(
    ctx: &FlowContext,
    flow: &mut TransactionFlow,
    account: Option<Address>,
    amount: &str,
) -> Result<()> {
    flow.begin()?;
    let admin = connected(flow, account)?;
    let amount = format::parse_usdc(amount).map_err(|e| flow.reject(e))?;
    if amount == 0 {
        return Err(flow.reject(ValidationError::NonPositiveAmount));
    }
    let pool = ctx.contracts.yield_pool(&ctx.chain)?;

    flow.submit(TxState::Depositing, pool.admin_add_yield(admin, amount))
        .await?;
    flow.succeed()
}

/// Move the pool's yield through the splitter.
pub async fn harvest(ctx: &FlowContext, flow: &mut TransactionFlow, account: Option<Address>) -> Result<()> {
    flow.begin()?;
    let caller = connected(flow, account)?;
    let vault = ctx.contracts.vault(&ctx.chain)?;

    flow.submit(TxState::Harvesting, vault.harvest_yield(caller)).await?;
    flow.succeed()
}

/// Mint test USDC to the caller.
pub async fn faucet(ctx: &FlowContext, flow: &mut TransactionFlow, account: Option<Address>) -> Result<()> {
    flow.begin()?;
    let caller = connected(flow, account)?;
    let stablecoin = ctx.contracts.stablecoin(&ctx.chain)?;

    flow.submit(TxState::Depositing, stablecoin.faucet(caller)).await?;
    flow.succeed()
}

/// A university registers its own wallet under its directory id.
pub async fn register_university(
    ctx: &FlowContext,
    flow: &mut TransactionFlow,
    account: Option<Address>,
    university: Option<&str>,
) -> Result<()> {
    flow.begin()?;
    let wallet = connected(flow, account)?;
    let id = university
        .filter(|id| !id.is_empty())
        .ok_or_else(|| flow.reject(ValidationError::UniversityNotSelected))?;
    let university =
        universities::by_id(id).ok_or_else(|| flow.reject(ValidationError::UnknownUniversity(id.to_string())))?;
    let registry = ctx.contracts.university_registry(&ctx.chain)?;

    if flow.read(registry.is_university_registered(university.id)).await? {
        return Err(flow.reject(ValidationError::UniversityAlreadyRegistered));
    }

    flow.submit(
        TxState::Registering,
        registry.register_university(wallet, university.id, university.name, wallet),
    )
    .await?;
    flow.succeed()
}

/// Register the caller as a student; mints the soulbound token when the
/// registry is configured.
pub async fn register_student(
    ctx: &FlowContext,
    flow: &mut TransactionFlow,
    account: Option<Address>,
    profile: &StudentProfile,
) -> Result<()> {
    flow.begin()?;
    let student = connected(flow, account)?;
    profile.validate().map_err(|e| flow.reject(e))?;
    let registry = ctx.contracts.student_registry(&ctx.chain)?;

    flow.submit(TxState::Registering, registry.register_student(student, profile))
        .await?;
    info!(
        "Registered {} with voting power {}",
        profile.name,
        profile.voting_power()
    );
    flow.succeed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ContractId;
    use crate::db;
    use crate::deploy::{self, DeployContext};
    use crate::format::USDC_UNIT;
    use crate::sim::SimChain;

    struct Fixture {
        ctx: FlowContext,
        accounts: Vec<Address>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let chain: Arc<dyn Chain> = Arc::new(SimChain::new());
        let accounts = chain.accounts().await.unwrap();
        let deploy_ctx = DeployContext {
            chain: chain.clone(),
            pool: db::init_pool("sqlite::memory:").await.unwrap(),
            deployer: accounts[0],
            university_wallet: accounts[9],
            wallets_dir: dir.path().to_path_buf(),
        };
        let contracts = deploy::ensure_deployed(&deploy_ctx).await.unwrap();
        Fixture {
            ctx: FlowContext { chain, contracts },
            accounts,
            _dir: dir,
        }
    }

    impl Fixture {
        async fn fund(&self, who: Address, amount: u128) {
            let stablecoin = self.ctx.contracts.stablecoin(&self.ctx.chain).unwrap();
            stablecoin.mint(self.accounts[0], who, amount).await.unwrap();
        }
    }

    #[test]
    fn loading_and_final_states() {
        let loading: Vec<TxState> = [
            TxState::Idle,
            TxState::CheckingAllowance,
            TxState::Approving,
            TxState::Depositing,
            TxState::Withdrawing,
            TxState::Harvesting,
            TxState::Splitting,
            TxState::Registering,
            TxState::Success,
            TxState::Error,
        ]
        .into_iter()
        .filter(TxState::is_loading)
        .collect();
        assert_eq!(loading.len(), 7);
        assert!(!TxState::Idle.is_loading());
        assert!(TxState::Error.is_final() && TxState::Success.is_final());
        assert_eq!(TxState::Approving.message(), "Approving USDC...");
        assert_eq!(serde_json::to_value(TxState::CheckingAllowance).unwrap(), "checking-allowance");
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut flow = TransactionFlow::new();
        assert!(flow.transition(TxState::Success).is_err());
        flow.transition(TxState::Withdrawing).unwrap();
        assert!(flow.transition(TxState::Approving).is_err());
        assert!(flow.begin().is_err());
        flow.transition(TxState::Success).unwrap();
        assert!(flow.transition(TxState::Error).is_err());
        flow.begin().unwrap();
        assert_eq!(flow.history(), &[TxState::Idle]);
    }

    #[tokio::test]
    async fn donate_approves_only_when_allowance_is_short() {
        let f = fixture().await;
        let donor = f.accounts[1];
        f.fund(donor, 10_000 * USDC_UNIT).await;

        let mut flow = TransactionFlow::new();
        donate(&f.ctx, &mut flow, Some(donor), Some("unam"), "100").await.unwrap();
        assert_eq!(
            flow.history(),
            &[
                TxState::Idle,
                TxState::CheckingAllowance,
                TxState::Approving,
                TxState::Depositing,
                TxState::Success
            ]
        );
        assert_eq!(flow.tx_hashes().len(), 2);

        let stablecoin = f.ctx.contracts.stablecoin(&f.ctx.chain).unwrap();
        let vault = f.ctx.contracts.vault(&f.ctx.chain).unwrap();
        stablecoin.approve(donor, vault.address, 500 * USDC_UNIT).await.unwrap();

        donate(&f.ctx, &mut flow, Some(donor), Some("unam"), "100").await.unwrap();
        assert_eq!(
            flow.history(),
            &[TxState::Idle, TxState::CheckingAllowance, TxState::Depositing, TxState::Success]
        );
        assert_eq!(flow.tx_hashes().len(), 1);

        let shares = vault.balance_of(donor).await.unwrap();
        assert_eq!(vault.convert_to_assets(shares).await.unwrap(), 200 * USDC_UNIT);
    }

    #[tokio::test]
    async fn validation_failures_submit_nothing() {
        let f = fixture().await;
        let donor = f.accounts[1];
        f.fund(donor, 50 * USDC_UNIT).await;
        let mut flow = TransactionFlow::new();

        let cases: [(Option<Address>, Option<&str>, &str, &str); 5] = [
            (None, Some("unam"), "20", "Please connect your wallet"),
            (Some(donor), None, "20", "Please select a university"),
            (Some(donor), Some("unam"), "0", "Amount must be greater than 0"),
            (Some(donor), Some("unam"), "60", "Insufficient balance"),
            (Some(donor), Some("unam"), "5", "Minimum donation is $10 USDC"),
        ];
        for (account, university, amount, message) in cases {
            let err = donate(&f.ctx, &mut flow, account, university, amount).await.unwrap_err();
            assert!(matches!(err, EndaomentError::Validation(_)));
            assert_eq!(flow.error(), Some(message));
            assert_eq!(flow.state(), TxState::Idle);
            assert!(flow.tx_hashes().is_empty());
        }
    }

    #[tokio::test]
    async fn reverts_surface_verbatim() {
        let f = fixture().await;
        let mut flow = TransactionFlow::new();

        let err = harvest(&f.ctx, &mut flow, Some(f.accounts[1])).await.unwrap_err();
        assert_eq!(flow.state(), TxState::Error);
        assert_eq!(flow.error(), Some(err.to_string().as_str()));
        assert!(err.to_string().starts_with("execution reverted"));

        let err = add_yield(&f.ctx, &mut flow, Some(f.accounts[1]), "500").await.unwrap_err();
        assert!(err.to_string().contains("caller is not the owner"));
    }

    #[tokio::test]
    async fn yield_harvest_splits_evenly() {
        let f = fixture().await;
        let donor = f.accounts[1];
        let stablecoin = f.ctx.contracts.stablecoin(&f.ctx.chain).unwrap();
        let treasury = f.ctx.contracts.address(ContractId::TimelockController).unwrap();
        let mut flow = TransactionFlow::new();

        faucet(&f.ctx, &mut flow, Some(donor)).await.unwrap();
        donate(&f.ctx, &mut flow, Some(donor), Some("tec"), "5000").await.unwrap();
        add_yield(&f.ctx, &mut flow, Some(f.accounts[0]), "500").await.unwrap();

        let university_before = stablecoin.balance_of(f.accounts[9]).await.unwrap();
        let treasury_before = stablecoin.balance_of(treasury).await.unwrap();
        harvest(&f.ctx, &mut flow, Some(donor)).await.unwrap();

        assert_eq!(
            stablecoin.balance_of(f.accounts[9]).await.unwrap() - university_before,
            250 * USDC_UNIT
        );
        assert_eq!(
            stablecoin.balance_of(treasury).await.unwrap() - treasury_before,
            250 * USDC_UNIT
        );
    }

    #[tokio::test]
    async fn withdraw_defaults_to_everything() {
        let f = fixture().await;
        let donor = f.accounts[2];
        let mut flow = TransactionFlow::new();
        faucet(&f.ctx, &mut flow, Some(donor)).await.unwrap();
        donate(&f.ctx, &mut flow, Some(donor), Some("ibero"), "1000").await.unwrap();

        withdraw(&f.ctx, &mut flow, Some(donor), Some("400")).await.unwrap();
        withdraw(&f.ctx, &mut flow, Some(donor), None).await.unwrap();
        assert_eq!(flow.history().last(), Some(&TxState::Success));

        let stablecoin = f.ctx.contracts.stablecoin(&f.ctx.chain).unwrap();
        let vault = f.ctx.contracts.vault(&f.ctx.chain).unwrap();
        assert_eq!(stablecoin.balance_of(donor).await.unwrap(), 10_000 * USDC_UNIT);
        assert_eq!(vault.balance_of(donor).await.unwrap(), 0);

        let err = withdraw(&f.ctx, &mut flow, Some(donor), None).await.unwrap_err();
        assert_eq!(err.to_string(), "Amount must be greater than 0");
    }

    #[tokio::test]
    async fn university_registers_once() {
        let f = fixture().await;
        let wallet = f.accounts[4];
        let mut flow = TransactionFlow::new();

        // The deploy pass had no wallet file, so nothing is registered yet.
        register_university(&f.ctx, &mut flow, Some(wallet), Some("udlap")).await.unwrap();
        let registry = f.ctx.contracts.university_registry(&f.ctx.chain).unwrap();
        let entry = registry.university("udlap").await.unwrap().unwrap();
        assert_eq!(entry.wallet, wallet);
        assert!(!entry.locked);

        let err = register_university(&f.ctx, &mut flow, Some(wallet), Some("udlap"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "This university is already registered");
        assert_eq!(flow.state(), TxState::Idle);
    }

    #[tokio::test]
    async fn student_registration_mints_voting_power() {
        let f = fixture().await;
        let student = f.accounts[3];
        let profile = StudentProfile {
            name: "Student One".to_string(),
            university: "unam".to_string(),
            research_area: "Ingeniería".to_string(),
            student_id: "12345678".to_string(),
            academic_achievements: 8,
            sports_achievements: 5,
            student_achievements: 3,
            id_document: None,
        };
        let mut flow = TransactionFlow::new();
        let mut states = flow.subscribe();

        register_student(&f.ctx, &mut flow, Some(student), &profile).await.unwrap();
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), TxState::Success);

        let sbt = f.ctx.contracts.soulbound_token(&f.ctx.chain).unwrap();
        assert!(sbt.has_sbt(student).await.unwrap());
        assert_eq!(sbt.voting_power_tenths(student).await.unwrap(), 26);

        let err = register_student(&f.ctx, &mut flow, Some(student), &profile).await.unwrap_err();
        assert!(err.to_string().contains("execution reverted"));
        assert_eq!(flow.state(), TxState::Error);

        let blank = StudentProfile::default();
        let err = register_student(&f.ctx, &mut flow, Some(f.accounts[5]), &blank)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please fill all required fields");
    }
}
