//! The EnDAOment deployment task set: constructor arguments and the
//! configuration calls each task performs after deploying.

use tracing::info;

use super::DeployContext;
use crate::abi::{Address, Token};
use crate::contracts::{ContractId, ContractRegistry};
use crate::errors::Result;
use crate::registration::{self, RegistrationSummary};
use crate::wallets::UniversityWallet;

/// Timelock delay: one hour.
pub const TIMELOCK_DELAY_SECS: u128 = 3600;
pub const VOTING_DELAY_BLOCKS: u128 = 0;
/// About five minutes at two seconds per block.
pub const VOTING_PERIOD_BLOCKS: u128 = 150;
pub const QUORUM_PERCENTAGE: u128 = 4;

pub const SBT_NAME: &str = "Student DAO Token";
pub const SBT_SYMBOL: &str = "SBT";
pub const VAULT_NAME: &str = "Lossless Donation Vault";
pub const VAULT_SYMBOL: &str = "LOSSVAULT";

pub const CONFIGURE_STUDENT_REGISTRY: &str = "ConfigureStudentRegistry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Deploy a contract, then run its post-deploy configuration.
    Deploy(ContractId),
    /// Point the student registry at the SBT and let it mint.
    ConfigureStudentRegistry,
}

#[derive(Debug, Clone)]
pub struct DeploymentTask {
    pub name: &'static str,
    pub dependencies: Vec<&'static str>,
    pub kind: TaskKind,
}

fn deploy(contract: ContractId, dependencies: &[ContractId]) -> DeploymentTask {
    DeploymentTask {
        name: contract.name(),
        dependencies: dependencies.iter().map(ContractId::name).collect(),
        kind: TaskKind::Deploy(contract),
    }
}

pub fn default_tasks() -> Vec<DeploymentTask> {
    use ContractId::*;

    vec![
        deploy(MockUsdc, &[]),
        deploy(MockAavePool, &[MockUsdc]),
        deploy(TimelockController, &[]),
        deploy(YieldSplitter, &[MockUsdc, TimelockController]),
        deploy(StudentSbt, &[]),
        deploy(MyGovernor, &[StudentSbt, TimelockController]),
        deploy(LosslessVault, &[MockUsdc, MockAavePool, YieldSplitter]),
        deploy(UniversityRegistry, &[]),
        deploy(DonationTracker, &[UniversityRegistry]),
        deploy(StudentRegistry, &[]),
        DeploymentTask {
            name: CONFIGURE_STUDENT_REGISTRY,
            dependencies: vec![StudentRegistry.name(), StudentSbt.name()],
            kind: TaskKind::ConfigureStudentRegistry,
        },
    ]
}

impl TaskKind {
    /// Registry tasks read the wallet key file.
    pub fn uses_wallet_file(&self) -> bool {
        matches!(
            self,
            TaskKind::Deploy(ContractId::UniversityRegistry | ContractId::DonationTracker)
        )
    }
}

/// Constructor (or configuration) arguments with prerequisites resolved
/// from the deployment records.
pub fn arguments(ctx: &DeployContext, kind: TaskKind, contracts: &ContractRegistry) -> Result<Vec<Token>> {
    use ContractId::*;

    let at = |id: ContractId| contracts.address(id).map(Token::Address);
    let contract = match kind {
        TaskKind::Deploy(contract) => contract,
        TaskKind::ConfigureStudentRegistry => return Ok(vec![at(StudentRegistry)?, at(StudentSbt)?]),
    };

    Ok(match contract {
        MockUsdc | UniversityRegistry | DonationTracker | StudentRegistry => vec![],
        MockAavePool => vec![at(MockUsdc)?],
        TimelockController => vec![
            Token::Uint(TIMELOCK_DELAY_SECS),
            Token::Array(vec![]),
            // Open execution
            Token::Array(vec![Token::Address(Address::ZERO)]),
            // The treasury keeps veto power
            Token::Array(vec![Token::Address(ctx.university_wallet)]),
        ],
        YieldSplitter => vec![
            at(MockUsdc)?,
            Token::Address(ctx.university_wallet),
            at(TimelockController)?,
        ],
        StudentSbt => vec![
            Token::String(SBT_NAME.to_string()),
            Token::String(SBT_SYMBOL.to_string()),
        ],
        MyGovernor => vec![
            at(StudentSbt)?,
            at(TimelockController)?,
            Token::Uint(VOTING_DELAY_BLOCKS),
            Token::Uint(VOTING_PERIOD_BLOCKS),
            Token::Uint(QUORUM_PERCENTAGE),
        ],
        LosslessVault => vec![
            at(MockUsdc)?,
            Token::String(VAULT_NAME.to_string()),
            Token::String(VAULT_SYMBOL.to_string()),
            at(MockAavePool)?,
            at(YieldSplitter)?,
        ],
    })
}

/// Configuration calls after `contract` was deployed. `contracts` already
/// contains the new address.
pub async fn after_deploy(
    ctx: &DeployContext,
    contract: ContractId,
    contracts: &ContractRegistry,
    wallets: Option<&[UniversityWallet]>,
) -> Result<Option<RegistrationSummary>> {
    let chain = &ctx.chain;
    let deployer = ctx.deployer;

    match contract {
        ContractId::MockAavePool => {
            let pool = contracts.address(ContractId::MockAavePool)?;
            contracts.stablecoin(chain)?.add_minter(deployer, pool).await?;
            info!("Granted MockUSDC minting to MockAavePool {pool}");
        }
        ContractId::MyGovernor => {
            let governor = contracts.address(ContractId::MyGovernor)?;
            let timelock = contracts.timelock(chain)?;
            let role = timelock.proposer_role().await?;
            timelock.grant_role(deployer, role, governor).await?;
            info!("Granted PROPOSER_ROLE to MyGovernor {governor}");
        }
        ContractId::UniversityRegistry => {
            let registry = contracts.university_registry(chain)?;
            return registration::register_in_registry(&registry, deployer, wallets)
                .await
                .map(Some);
        }
        ContractId::DonationTracker => {
            let tracker = contracts.donation_tracker(chain)?;
            return registration::register_in_tracker(&tracker, deployer, wallets)
                .await
                .map(Some);
        }
        _ => {}
    }
    Ok(None)
}

pub async fn configure_student_registry(ctx: &DeployContext, contracts: &ContractRegistry) -> Result<()> {
    let registry = contracts.student_registry(&ctx.chain)?;
    let sbt = contracts.soulbound_token(&ctx.chain)?;

    registry.set_student_sbt(ctx.deployer, sbt.address).await?;
    info!("StudentSBT {} set on StudentRegistry", sbt.address);
    sbt.add_authorized_minter(ctx.deployer, registry.address).await?;
    info!("StudentRegistry {} may mint StudentSBT", registry.address);
    Ok(())
}
