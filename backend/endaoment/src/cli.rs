//! Command-line interface.
//!
//! Every command opens the configured network. On `sim` the chain and the
//! record store live in memory for the length of one invocation, so commands
//! that need contracts deploy the full task set first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::abi::Address;
use crate::api::{self, ApiState};
use crate::chain::Chain;
use crate::config::Config;
use crate::contracts::ContractRegistry;
use crate::dashboard;
use crate::db;
use crate::deploy::{self, DeployContext, DeployOptions};
use crate::errors::{EndaomentError, Result, ValidationError};
use crate::flows::{self, FlowContext, TransactionFlow};
use crate::format;
use crate::ipfs::IpfsClient;
use crate::rpc::JsonRpcChain;
use crate::scripts;
use crate::session::{self, DonorProfile, SessionStore, UserType};
use crate::sim::SimChain;
use crate::student::RegistrationWizard;
use crate::universities;
use crate::wallets;

#[derive(Debug, Parser)]
#[command(name = "endaoment", version, about = "EnDAOment deployment and donation tooling")]
pub struct Cli {
    /// Target network; `sim` runs the contracts in process
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Signer: an address or an index into the node's accounts
    #[arg(long, global = true)]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy and configure the contract suite
    Deploy {
        /// Redeploy tasks even when nothing changed
        #[arg(long)]
        force: bool,
        /// Forget the network's records before deploying
        #[arg(long)]
        reset: bool,
        /// Run only this task and its prerequisites (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// List the deployment records of the network
    Deployments,
    /// University wallet key files
    Wallets {
        #[command(subcommand)]
        command: WalletsCommand,
    },
    /// Serve the REST API
    Serve,
    /// Donate USDC to the vault for a university
    Donate { university: String, amount: String },
    /// Withdraw principal; everything when no amount is given
    Withdraw { amount: Option<String> },
    /// Inject yield into the pool (pool owner)
    AddYield { amount: String },
    /// Harvest pool yield through the splitter
    Harvest,
    /// Mint 10,000 test USDC to the signer
    Faucet,
    /// Register the signer's wallet for a university
    RegisterUniversity { university: String },
    /// Register the signer as a student
    RegisterStudent(StudentArgs),
    /// Transfer USDC from the signer, minting any shortfall when allowed
    TransferUsdc {
        #[arg(long)]
        to: Option<Address>,
        /// Amount in USDC (default 10,000,000)
        #[arg(long)]
        amount: Option<String>,
    },
    /// Run the end-to-end donation scenario
    FullFlow,
    Dashboard {
        #[command(subcommand)]
        view: DashboardView,
    },
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// List the university directory
    Universities,
    /// ID documents and other content references
    Document {
        #[command(subcommand)]
        command: DocumentCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum WalletsCommand {
    /// Generate wallets for every university
    Generate {
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct StudentArgs {
    #[arg(long)]
    pub university: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub research_area: String,
    #[arg(long)]
    pub student_id: String,
    #[arg(long, default_value_t = 0)]
    pub academic: u32,
    #[arg(long, default_value_t = 0)]
    pub sports: u32,
    #[arg(long, default_value_t = 0)]
    pub student: u32,
    /// ID document to upload
    #[arg(long)]
    pub id_document: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum DashboardView {
    /// Balances, principal and yield projections of the signer
    Donor,
    /// Donations and yield of a university
    University {
        id: String,
        /// Wallet to inspect; defaults to the key file, then the directory
        #[arg(long)]
        wallet: Option<Address>,
    },
    /// Yield pool and vault totals
    Pool,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    Show,
    SetUserType {
        #[arg(value_enum)]
        user_type: UserType,
    },
    SetProfile {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Image file stored inline as a data URL
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DocumentCommand {
    Upload { path: PathBuf },
    Fetch {
        hash: String,
        #[arg(long)]
        out: PathBuf,
        /// Gateway base URL
        #[arg(long)]
        gateway: Option<String>,
    },
}

// ─────────────────────────────────────────────────────────
// Runtime
// ─────────────────────────────────────────────────────────

struct Runtime {
    config: Config,
    chain: Arc<dyn Chain>,
    pool: SqlitePool,
}

impl Runtime {
    async fn open(config: Config) -> Result<Self> {
        let chain: Arc<dyn Chain> = if config.is_sim() {
            Arc::new(SimChain::new())
        } else {
            Arc::new(JsonRpcChain::new(
                config.rpc_url.clone(),
                config.network.clone(),
                config.artifacts_dir.clone(),
                Duration::from_millis(config.confirmation_poll_ms),
            ))
        };
        let database_url = if config.is_sim() {
            "sqlite::memory:"
        } else {
            config.database_url.as_str()
        };
        let pool = db::init_pool(database_url).await?;
        info!("Opened network {} (chain id {})", config.network, chain.chain_id().await?);
        Ok(Runtime { config, chain, pool })
    }

    async fn deploy_context(&self) -> Result<DeployContext> {
        let deployer = match self.config.deployer {
            Some(deployer) => deployer,
            None => self
                .chain
                .accounts()
                .await?
                .first()
                .copied()
                .ok_or_else(|| EndaomentError::Config("node has no unlocked accounts".to_string()))?,
        };
        Ok(DeployContext {
            chain: self.chain.clone(),
            pool: self.pool.clone(),
            deployer,
            university_wallet: self.config.university_wallet.unwrap_or(deployer),
            wallets_dir: self.config.wallets_dir.clone(),
        })
    }

    /// Registry for the network; on `sim` the suite is deployed first.
    async fn contracts(&self) -> Result<ContractRegistry> {
        if self.config.is_sim() {
            return deploy::ensure_deployed(&self.deploy_context().await?).await;
        }
        ContractRegistry::load(&self.pool, &self.config.network).await
    }

    async fn flow_context(&self) -> Result<FlowContext> {
        Ok(FlowContext {
            chain: self.chain.clone(),
            contracts: self.contracts().await?,
        })
    }

    /// `--account` as an address or account index; the deployer otherwise.
    async fn signer(&self, account: Option<&str>) -> Result<Address> {
        let Some(raw) = account else {
            return Ok(self.deploy_context().await?.deployer);
        };
        if let Ok(address) = raw.parse::<Address>() {
            return Ok(address);
        }
        let index: usize = raw
            .parse()
            .map_err(|_| EndaomentError::Config(format!("--account must be an address or index: {raw}")))?;
        self.chain
            .accounts()
            .await?
            .get(index)
            .copied()
            .ok_or_else(|| EndaomentError::Config(format!("no account at index {index}")))
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A flow whose state changes are logged as they happen.
fn followed_flow() -> TransactionFlow {
    let flow = TransactionFlow::new();
    let mut states = flow.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!("{}", state.message());
        }
    });
    flow
}

fn report_flow(flow: &TransactionFlow, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => {
            println!("{}", flow.state().message());
            for hash in flow.tx_hashes() {
                println!("  tx {hash}");
            }
            Ok(())
        }
        Err(e) => {
            warn!("{}: {e}", flow.state().message());
            Err(e)
        }
    }
}

pub async fn execute(cli: Cli, mut config: Config) -> Result<()> {
    if let Some(network) = cli.network {
        config.network = network;
    }

    // Commands that never touch a chain.
    match &cli.command {
        Command::Wallets {
            command: WalletsCommand::Generate { force },
        } => return generate_wallets(&config, *force),
        Command::Session { command } => return session_command(&config, command),
        Command::Universities => return print_json(&universities::active().collect::<Vec<_>>()),
        Command::Document { command } => return document_command(&config, command).await,
        _ => {}
    }

    let runtime = Runtime::open(config).await?;
    let account = cli.account.as_deref();

    match cli.command {
        Command::Deploy { force, reset, tags } => {
            let ctx = runtime.deploy_context().await?;
            if reset {
                let removed = db::clear_network(&runtime.pool, ctx.network()).await?;
                info!("Cleared {removed} record(s) for {}", ctx.network());
            }
            let report = deploy::run(&ctx, &deploy::default_tasks(), &DeployOptions { force, tags }).await?;
            print_json(&report)?;
            if !report.succeeded() {
                return Err(EndaomentError::TaskGraph("deployment did not complete".to_string()));
            }
        }
        Command::Deployments => {
            if runtime.config.is_sim() {
                runtime.contracts().await?;
            }
            let views = db::list_deployments(&runtime.pool, &runtime.config.network)
                .await?
                .iter()
                .map(|record| record.view())
                .collect::<Result<Vec<_>>>()?;
            print_json(&views)?;
        }
        Command::Serve => {
            if runtime.config.is_sim() {
                runtime.contracts().await?;
            }
            let app = api::router(Arc::new(ApiState {
                pool: runtime.pool.clone(),
            }));
            let addr = format!("0.0.0.0:{}", runtime.config.api_port);
            info!("API listening on http://{addr}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
        }
        Command::Donate { university, amount } => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::donate(&ctx, &mut flow, Some(signer), Some(&university), &amount).await;
            report_flow(&flow, outcome)?;
        }
        Command::Withdraw { amount } => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::withdraw(&ctx, &mut flow, Some(signer), amount.as_deref()).await;
            report_flow(&flow, outcome)?;
        }
        Command::AddYield { amount } => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::add_yield(&ctx, &mut flow, Some(signer), &amount).await;
            report_flow(&flow, outcome)?;
        }
        Command::Harvest => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::harvest(&ctx, &mut flow, Some(signer)).await;
            report_flow(&flow, outcome)?;
        }
        Command::Faucet => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::faucet(&ctx, &mut flow, Some(signer)).await;
            report_flow(&flow, outcome)?;
        }
        Command::RegisterUniversity { university } => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let mut flow = followed_flow();
            let outcome = flows::register_university(&ctx, &mut flow, Some(signer), Some(&university)).await;
            report_flow(&flow, outcome)?;
        }
        Command::RegisterStudent(args) => {
            let ctx = runtime.flow_context().await?;
            let signer = runtime.signer(account).await?;
            let ipfs = IpfsClient::new(runtime.config.ipfs_api_url.clone());

            let mut wizard = RegistrationWizard::new();
            wizard.select_university(&args.university)?;
            wizard.next()?;
            wizard.set_personal_info(&args.name, &args.research_area, &args.student_id);
            wizard.next()?;
            wizard.set_achievements(args.academic, args.sports, args.student)?;
            if let Some(path) = &args.id_document {
                let reference = upload_id_document(&ipfs, path).await?;
                wizard.attach_id_document(reference);
            }
            info!("Voting power preview: {:.1}", wizard.voting_power_preview());
            let profile = wizard.finish()?;

            let mut flow = followed_flow();
            let outcome = flows::register_student(&ctx, &mut flow, Some(signer), &profile).await;
            report_flow(&flow, outcome)?;

            if runtime.config.ipfs_api_url.is_some() {
                let reference = ipfs.upload_metadata(&serde_json::to_value(&profile)?).await?;
                info!("Profile metadata stored at {}", ipfs.gateway_url(&reference));
            }
        }
        Command::TransferUsdc { to, amount } => {
            let contracts = runtime.contracts().await?;
            let signer = runtime.signer(account).await?;
            let target = scripts::resolve_target(to, runtime.config.target_address)?;
            let amount = match amount {
                Some(raw) => format::parse_usdc(&raw)?,
                None => scripts::DEFAULT_TRANSFER,
            };
            let summary = scripts::transfer_usdc(&runtime.chain, &contracts, signer, target, amount).await?;
            print_json(&summary)?;
        }
        Command::FullFlow => {
            let summary = scripts::full_flow(&runtime.deploy_context().await?).await?;
            print!("{summary}");
        }
        Command::Dashboard { view } => {
            let contracts = runtime.contracts().await?;
            match view {
                DashboardView::Donor => {
                    let signer = runtime.signer(account).await?;
                    print!("{}", dashboard::donor(&runtime.chain, &contracts, signer).await?);
                }
                DashboardView::University { id, wallet } => {
                    let university = universities::by_id(&id)
                        .ok_or_else(|| ValidationError::UnknownUniversity(id.clone()))?;
                    let wallet = match wallet.or(university_wallet(&runtime.config, &id)?) {
                        Some(wallet) => wallet,
                        None => university.wallet_address()?,
                    };
                    print!(
                        "{}",
                        dashboard::university(&runtime.chain, &contracts, university, wallet).await?
                    );
                }
                DashboardView::Pool => {
                    print!("{}", dashboard::pool(&runtime.chain, &contracts).await?);
                }
            }
        }
        Command::Wallets { .. } | Command::Session { .. } | Command::Universities | Command::Document { .. } => {}
    }
    Ok(())
}

/// Address of `id` in the wallet key file, when the file has one.
fn university_wallet(config: &Config, id: &str) -> Result<Option<Address>> {
    let Some(wallets) = wallets::load(&config.wallets_dir)? else {
        return Ok(None);
    };
    wallets
        .iter()
        .find(|w| w.id == id)
        .map(|w| w.address())
        .transpose()
}

fn generate_wallets(config: &Config, force: bool) -> Result<()> {
    let dir = &config.wallets_dir;
    if !force && wallets::secret_path(dir).exists() {
        return Err(EndaomentError::Wallet(format!(
            "{} already exists, pass --force to replace it",
            wallets::secret_path(dir).display()
        )));
    }
    let generated = wallets::generate();
    wallets::write_files(dir, &generated)?;
    for wallet in &generated {
        println!("{:<45} {}", wallet.name, wallet.address);
    }
    Ok(())
}

fn session_command(config: &Config, command: &SessionCommand) -> Result<()> {
    let mut store = SessionStore::load(&config.session_path)?;
    match command {
        SessionCommand::Show => {}
        SessionCommand::SetUserType { user_type } => store.set_user_type(*user_type)?,
        SessionCommand::SetProfile {
            name,
            description,
            image,
        } => {
            let image = image.as_deref().map(session::load_image).transpose()?;
            store.set_profile(DonorProfile {
                name: name.clone(),
                description: description.clone(),
                image,
            })?;
        }
    }
    info!("Session file {}", store.path().display());
    print_json(store.session())
}

async fn upload_id_document(ipfs: &IpfsClient, path: &std::path::Path) -> Result<String> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("id-document")
        .to_string();
    let bytes = std::fs::read(path)?;
    ipfs.upload(&file_name, bytes)
        .await
        .map_err(|e| EndaomentError::Rpc(format!("Failed to upload ID document: {e}")))
}

async fn document_command(config: &Config, command: &DocumentCommand) -> Result<()> {
    let ipfs = IpfsClient::new(config.ipfs_api_url.clone());
    match command {
        DocumentCommand::Upload { path } => {
            let reference = upload_id_document(&ipfs, path).await?;
            println!("{reference}");
            println!("{}", ipfs.gateway_url(&reference));
        }
        DocumentCommand::Fetch { hash, out, gateway } => {
            let ipfs = match gateway {
                Some(gateway) => ipfs.with_gateway(gateway.as_str()),
                None => ipfs,
            };
            let bytes = ipfs.download(hash).await?;
            std::fs::write(out, &bytes)?;
            info!("Wrote {} bytes to {}", bytes.len(), out.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn help_and_usage_errors_come_from_parsing_alone() {
        let err = Cli::try_parse_from(["endaoment", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("deploy"));

        let err = Cli::try_parse_from(["endaoment", "donate"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "endaoment",
            "donate",
            "unam",
            "100",
            "--network",
            "sim",
            "--account",
            "1",
        ]);
        assert_eq!(cli.network.as_deref(), Some("sim"));
        assert_eq!(cli.account.as_deref(), Some("1"));
        assert!(matches!(cli.command, Command::Donate { ref university, .. } if university == "unam"));

        let cli = Cli::parse_from(["endaoment", "deploy", "--tag", "MyGovernor", "--tag", "LosslessVault"]);
        let Command::Deploy { tags, force, .. } = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(tags, vec!["MyGovernor", "LosslessVault"]);
        assert!(!force);

        let cli = Cli::parse_from(["endaoment", "session", "set-user-type", "university"]);
        assert!(matches!(
            cli.command,
            Command::Session {
                command: SessionCommand::SetUserType {
                    user_type: UserType::University
                }
            }
        ));
    }

    fn sim_config(dir: &std::path::Path) -> Config {
        Config {
            network: "sim".to_string(),
            rpc_url: String::new(),
            database_url: "sqlite::memory:".to_string(),
            api_port: 0,
            artifacts_dir: dir.join("artifacts"),
            wallets_dir: dir.to_path_buf(),
            session_path: dir.join("session.json"),
            deployer: None,
            university_wallet: None,
            target_address: None,
            confirmation_poll_ms: 10,
            ipfs_api_url: None,
        }
    }

    #[tokio::test]
    async fn sim_runtime_resolves_signers_and_contracts() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::open(sim_config(dir.path())).await.unwrap();
        let accounts = runtime.chain.accounts().await.unwrap();

        assert_eq!(runtime.signer(None).await.unwrap(), accounts[0]);
        assert_eq!(runtime.signer(Some("2")).await.unwrap(), accounts[2]);
        assert_eq!(
            runtime.signer(Some(&accounts[5].to_string())).await.unwrap(),
            accounts[5]
        );
        assert!(runtime.signer(Some("99")).await.is_err());

        let contracts = runtime.contracts().await.unwrap();
        let again = runtime.contracts().await.unwrap();
        assert_eq!(
            contracts.address(crate::contracts::ContractId::LosslessVault).unwrap(),
            again.address(crate::contracts::ContractId::LosslessVault).unwrap()
        );
    }

    #[tokio::test]
    async fn offline_commands_use_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = sim_config(dir.path());

        generate_wallets(&config, false).unwrap();
        assert!(generate_wallets(&config, false).is_err());
        generate_wallets(&config, true).unwrap();
        assert!(university_wallet(&config, "buap").unwrap().is_some());

        let cli = Cli::parse_from(["endaoment", "session", "set-user-type", "donor"]);
        execute(cli, config.clone()).await.unwrap();
        let store = SessionStore::load(&config.session_path).unwrap();
        assert_eq!(store.session().user_type, Some(UserType::Donor));
    }

    #[tokio::test]
    async fn flow_commands_run_on_sim() {
        let dir = tempfile::tempdir().unwrap();
        let config = sim_config(dir.path());

        let cli = Cli::parse_from(["endaoment", "faucet", "--account", "1"]);
        execute(cli, config.clone()).await.unwrap();

        // Each sim invocation starts from a fresh chain, so account 1 has nothing to donate.
        let cli = Cli::parse_from(["endaoment", "donate", "unam", "100", "--account", "1"]);
        let err = execute(cli, config).await.unwrap_err();
        assert_eq!(err.to_string(), "Insufficient balance");
    }
}
