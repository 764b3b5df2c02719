//! Deployment orchestrator.
//!
//! Runs the deployment tasks as a dependency graph against one network:
//!
//! 1. Select the tagged tasks and their prerequisites, order them (Kahn).
//! 2. For each task, require a completion record for every prerequisite,
//!    resolve prerequisite addresses from the deployment records and compute
//!    a fingerprint of everything the task would submit.
//! 3. Skip the task when the stored fingerprint matches (and its deployment
//!    record exists), unless forced. Otherwise deploy, persist the record,
//!    run the post-deploy configuration and record completion.
//!
//! The first failure stops the run. Completed tasks keep their records, the
//! report says which tasks ran, were skipped, failed or never started.

pub mod graph;
pub mod tasks;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::abi::{self, Address};
use crate::chain::Chain;
use crate::contracts::{ContractId, ContractRegistry};
use crate::db;
use crate::errors::{EndaomentError, Result};
use crate::registration::RegistrationSummary;
use crate::wallets;

pub use tasks::{default_tasks, DeploymentTask, TaskKind};

pub struct DeployContext {
    pub chain: Arc<dyn Chain>,
    pub pool: SqlitePool,
    /// Named deployer signer
    pub deployer: Address,
    /// Institutional treasury: splitter beneficiary and timelock canceller
    pub university_wallet: Address,
    pub wallets_dir: PathBuf,
}

impl DeployContext {
    pub fn network(&self) -> &str {
        self.chain.network()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Redeploy even when the stored fingerprint matches
    pub force: bool,
    /// Run only these tasks and their prerequisites
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Deployed { address: Address },
    Configured,
    Skipped,
    Failed { message: String },
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: &'static str,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub network: String,
    pub tasks: Vec<TaskReport>,
}

impl DeploymentReport {
    pub fn succeeded(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| !matches!(t.outcome, TaskOutcome::Failed { .. } | TaskOutcome::NotRun))
    }

    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|t| t.task == task).map(|t| &t.outcome)
    }
}

/// Run `tasks` (narrowed by `options.tags`) in dependency order.
///
/// Graph errors (unknown tags, cycles) are returned as errors before any
/// task runs; task failures are reported in the returned report.
pub async fn run(
    ctx: &DeployContext,
    tasks: &[DeploymentTask],
    options: &DeployOptions,
) -> Result<DeploymentReport> {
    let selected = graph::closure(tasks, &options.tags)?;
    let order = graph::topological_order(&selected)?;
    info!(
        "Deploying {} task(s) to {} as {}",
        order.len(),
        ctx.network(),
        ctx.deployer
    );

    let mut report = DeploymentReport {
        network: ctx.network().to_string(),
        tasks: Vec::with_capacity(order.len()),
    };
    let mut failed = false;

    for task in order {
        if failed {
            report.tasks.push(TaskReport {
                task: task.name,
                outcome: TaskOutcome::NotRun,
                registration: None,
            });
            continue;
        }
        match execute(ctx, task, options.force).await {
            Ok((outcome, registration)) => report.tasks.push(TaskReport {
                task: task.name,
                outcome,
                registration,
            }),
            Err(e) => {
                error!("Task {} failed: {e}", task.name);
                failed = true;
                report.tasks.push(TaskReport {
                    task: task.name,
                    outcome: TaskOutcome::Failed {
                        message: e.to_string(),
                    },
                    registration: None,
                });
            }
        }
    }

    Ok(report)
}

/// Run the full task set and return the resulting registry. Used where a
/// complete deployment is a precondition (sim sessions, scripts).
pub async fn ensure_deployed(ctx: &DeployContext) -> Result<ContractRegistry> {
    let report = run(ctx, &default_tasks(), &DeployOptions::default()).await?;
    for task in &report.tasks {
        if let TaskOutcome::Failed { message } = &task.outcome {
            return Err(EndaomentError::TaskGraph(format!(
                "deployment task {} failed: {message}",
                task.task
            )));
        }
    }
    ContractRegistry::load(&ctx.pool, ctx.network()).await
}

fn fingerprint(
    task: &DeploymentTask,
    prerequisites: &BTreeMap<&str, String>,
    args: &[abi::Token],
    wallet_file: Option<&str>,
) -> String {
    let material = json!({
        "task": task.name,
        "prerequisites": prerequisites,
        "args": abi::tokens_to_json(args),
        "wallets": wallet_file,
    });
    hex::encode(abi::keccak256(material.to_string().as_bytes()))
}

async fn execute(
    ctx: &DeployContext,
    task: &DeploymentTask,
    force: bool,
) -> Result<(TaskOutcome, Option<RegistrationSummary>)> {
    let network = ctx.network();

    for dependency in &task.dependencies {
        if db::get_task_run(&ctx.pool, network, dependency).await?.is_none() {
            return Err(EndaomentError::TaskGraph(format!(
                "prerequisite {dependency} of {} has not completed on {network}",
                task.name
            )));
        }
    }

    let mut contracts = ContractRegistry::load(&ctx.pool, network).await?;
    let mut prerequisites = BTreeMap::new();
    for dependency in &task.dependencies {
        if let Ok(id) = dependency.parse::<ContractId>() {
            prerequisites.insert(*dependency, contracts.address(id)?.to_string());
        }
    }

    let args = tasks::arguments(ctx, task.kind, &contracts)?;
    let wallet_file = if task.kind.uses_wallet_file() {
        wallets::raw_contents(&ctx.wallets_dir)?
    } else {
        None
    };
    let parsed_wallets = match &wallet_file {
        Some(raw) => Some(serde_json::from_str::<Vec<wallets::UniversityWallet>>(raw).map_err(|e| {
            EndaomentError::Wallet(format!("cannot parse {}: {e}", wallets::SECRET_FILE))
        })?),
        None => None,
    };
    let fingerprint = fingerprint(task, &prerequisites, &args, wallet_file.as_deref());

    if !force && is_current(ctx, task, &fingerprint).await? {
        info!("Skipping {}: already deployed with the same configuration", task.name);
        return Ok((TaskOutcome::Skipped, None));
    }

    let result = match task.kind {
        TaskKind::Deploy(contract) => {
            let deployment = ctx.chain.deploy(ctx.deployer, contract, args.clone()).await?;
            let address = deployment.address;
            info!(
                "{contract} deployed at {address} (tx {}, block {})",
                deployment.receipt.transaction_hash, deployment.receipt.block_number
            );

            db::upsert_deployment(
                &ctx.pool,
                &db::NewDeployment {
                    network,
                    name: contract.name(),
                    address: &address.to_string(),
                    abi: &deployment.abi,
                    args: &abi::tokens_to_json(&args),
                    receipt: &serde_json::to_value(&deployment.receipt)?,
                },
            )
            .await?;
            contracts.insert(contract, address);

            let registration =
                tasks::after_deploy(ctx, contract, &contracts, parsed_wallets.as_deref()).await?;
            (TaskOutcome::Deployed { address }, registration)
        }
        TaskKind::ConfigureStudentRegistry => {
            tasks::configure_student_registry(ctx, &contracts).await?;
            (TaskOutcome::Configured, None)
        }
    };

    db::save_task_run(&ctx.pool, network, task.name, &fingerprint).await?;
    Ok(result)
}

async fn is_current(ctx: &DeployContext, task: &DeploymentTask, fingerprint: &str) -> Result<bool> {
    let network = ctx.network();
    let Some(run) = db::get_task_run(&ctx.pool, network, task.name).await? else {
        return Ok(false);
    };
    if run.fingerprint != fingerprint {
        return Ok(false);
    }
    match task.kind {
        TaskKind::Deploy(contract) => Ok(db::get_deployment(&ctx.pool, network, contract.name())
            .await?
            .is_some()),
        TaskKind::ConfigureStudentRegistry => Ok(true),
    }
}
