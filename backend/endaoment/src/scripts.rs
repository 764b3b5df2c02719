//! Operator scripts: the USDC transfer helper and the end-to-end scenario.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::abi::Address;
use crate::chain::Chain;
use crate::contracts::ContractRegistry;
use crate::deploy::{self, DeployContext};
use crate::errors::{EndaomentError, Result};
use crate::flows::{self, FlowContext, TransactionFlow};
use crate::format::{self, USDC_UNIT};
use crate::student::StudentProfile;

/// Default amount moved by [`transfer_usdc`]: ten million USDC.
pub const DEFAULT_TRANSFER: u128 = 10_000_000 * USDC_UNIT;

/// Recipient used when neither `--to` nor `TARGET_ADDRESS` is given.
pub const DEFAULT_TARGET: &str = "0x2fa252f1b0b095e1ed6ba6dfdc40abe04d42b5d1";

// ─────────────────────────────────────────────────────────
// USDC transfer
// ─────────────────────────────────────────────────────────

/// `--to`, then `TARGET_ADDRESS`, then [`DEFAULT_TARGET`].
pub fn resolve_target(flag: Option<Address>, env: Option<Address>) -> Result<Address> {
    match flag.or(env) {
        Some(target) => Ok(target),
        None => DEFAULT_TARGET
            .parse()
            .map_err(|_| EndaomentError::Config(format!("bad default target {DEFAULT_TARGET}"))),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
    /// Shortfall minted before the transfer
    pub minted: u128,
    pub tx_hash: String,
    pub recipient_balance: u128,
}

/// Send `amount` from `from` to `to`, minting any shortfall first when
/// `from` is the stablecoin owner or a minter.
pub async fn transfer_usdc(
    chain: &Arc<dyn Chain>,
    contracts: &ContractRegistry,
    from: Address,
    to: Address,
    amount: u128,
) -> Result<TransferSummary> {
    let stablecoin = contracts.stablecoin(chain)?;
    let balance = stablecoin.balance_of(from).await?;
    info!(
        "Transferring {} USDC from {from} (balance {}) to {to}",
        format::format_usdc_with_commas(amount),
        format::format_usdc_with_commas(balance)
    );

    let mut minted = 0;
    if balance < amount {
        let shortfall = amount - balance;
        let can_mint = stablecoin.owner().await? == from || stablecoin.is_minter(from).await?;
        if !can_mint {
            return Err(EndaomentError::InsufficientFunds(format!(
                "{from} holds {} USDC, needs {}, and cannot mint",
                format::format_usdc_with_commas(balance),
                format::format_usdc_with_commas(amount)
            )));
        }
        let receipt = stablecoin.mint(from, from, shortfall).await?;
        info!(
            "Minted {} USDC shortfall (tx {})",
            format::format_usdc_with_commas(shortfall),
            receipt.transaction_hash
        );
        minted = shortfall;
    }

    let receipt = stablecoin.transfer(from, to, amount).await?;
    let recipient_balance = stablecoin.balance_of(to).await?;
    info!(
        "Transfer confirmed in block {} (tx {}), recipient now holds {} USDC",
        receipt.block_number,
        receipt.transaction_hash,
        format::format_usdc_with_commas(recipient_balance)
    );

    Ok(TransferSummary {
        from,
        to,
        amount,
        minted,
        tx_hash: receipt.transaction_hash,
        recipient_balance,
    })
}

// ─────────────────────────────────────────────────────────
// Full flow
// ─────────────────────────────────────────────────────────

const DONOR_FUNDING: u128 = 10_000 * USDC_UNIT;
const DONATION: &str = "5000";
const INJECTED_YIELD: &str = "500";
/// Each side of the 50/50 split of the injected yield.
const EXPECTED_SHARE: u128 = 250 * USDC_UNIT;

fn scenario_students() -> [StudentProfile; 2] {
    [
        StudentProfile {
            name: "Student One".to_string(),
            university: "unam".to_string(),
            research_area: "Ingeniería".to_string(),
            student_id: "12345678".to_string(),
            academic_achievements: 8,
            sports_achievements: 5,
            student_achievements: 3,
            id_document: None,
        },
        StudentProfile {
            name: "Student Two".to_string(),
            university: "unam".to_string(),
            research_area: "Medicina".to_string(),
            student_id: "87654321".to_string(),
            academic_achievements: 9,
            sports_achievements: 7,
            student_achievements: 4,
            id_document: None,
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub address: Address,
    pub name: String,
    pub voting_power: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullFlowSummary {
    pub donor: Address,
    pub donated: u128,
    pub yield_injected: u128,
    pub university_wallet: Address,
    pub university_received: u128,
    pub treasury: Address,
    pub treasury_received: u128,
    pub students: Vec<StudentSummary>,
}

impl fmt::Display for FullFlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let usd = |amount: u128| format!("${}", format::format_usdc_with_commas(amount));
        writeln!(f, "Full flow summary")?;
        writeln!(f, "  Donor {} donated {}", self.donor, usd(self.donated))?;
        writeln!(f, "  Yield injected: {}", usd(self.yield_injected))?;
        writeln!(
            f,
            "  University {} received {}",
            self.university_wallet,
            usd(self.university_received)
        )?;
        writeln!(f, "  DAO treasury {} received {}", self.treasury, usd(self.treasury_received))?;
        for student in &self.students {
            writeln!(
                f,
                "  Student {} ({}) voting power {:.1}",
                student.name, student.address, student.voting_power
            )?;
        }
        Ok(())
    }
}

fn expect_share(who: &str, received: u128) -> Result<()> {
    if received != EXPECTED_SHARE {
        return Err(EndaomentError::Scenario(format!(
            "{who} received {} USDC, expected {}",
            format::format_usdc(received),
            format::format_usdc(EXPECTED_SHARE)
        )));
    }
    Ok(())
}

/// Deploy, donate, inject yield, harvest, check the split, then register two
/// students and check their soulbound tokens.
pub async fn full_flow(ctx: &DeployContext) -> Result<FullFlowSummary> {
    let contracts = deploy::ensure_deployed(ctx).await?;
    let chain = ctx.chain.clone();
    let accounts = chain.accounts().await?;
    let &[_, donor, first_student, second_student, ..] = accounts.as_slice() else {
        return Err(EndaomentError::Scenario(format!(
            "need at least 4 accounts, node has {}",
            accounts.len()
        )));
    };
    let deployer = ctx.deployer;

    let stablecoin = contracts.stablecoin(&chain)?;
    let splitter = contracts.splitter(&chain)?;
    let sbt = contracts.soulbound_token(&chain)?;
    let registry = contracts.student_registry(&chain)?;
    let university_wallet = splitter.university_wallet().await?;
    let treasury = splitter.timelock().await?;

    info!("Step 1: minting {} USDC to donor {donor}", format::format_usdc_with_commas(DONOR_FUNDING));
    stablecoin.mint(deployer, donor, DONOR_FUNDING).await?;

    let flow_ctx = FlowContext {
        chain: chain.clone(),
        contracts: contracts.clone(),
    };
    let mut flow = TransactionFlow::new();

    info!("Step 2: donating {DONATION} USDC");
    flows::donate(&flow_ctx, &mut flow, Some(donor), Some("unam"), DONATION).await?;

    info!("Step 3: injecting {INJECTED_YIELD} USDC of yield");
    flows::add_yield(&flow_ctx, &mut flow, Some(deployer), INJECTED_YIELD).await?;

    info!("Step 4: harvesting");
    let university_before = stablecoin.balance_of(university_wallet).await?;
    let treasury_before = stablecoin.balance_of(treasury).await?;
    flows::harvest(&flow_ctx, &mut flow, Some(deployer)).await?;
    let university_received = stablecoin
        .balance_of(university_wallet)
        .await?
        .saturating_sub(university_before);
    let treasury_received = stablecoin.balance_of(treasury).await?.saturating_sub(treasury_before);
    expect_share("University wallet", university_received)?;
    expect_share("DAO treasury", treasury_received)?;

    info!("Step 5: registering students");
    let mut students = Vec::new();
    for (address, profile) in [first_student, second_student].into_iter().zip(scenario_students()) {
        flows::register_student(&flow_ctx, &mut flow, Some(address), &profile).await?;
        if !registry.is_registered(address).await? {
            return Err(EndaomentError::Scenario(format!("{} is not registered", profile.name)));
        }
        if !sbt.has_sbt(address).await? {
            return Err(EndaomentError::Scenario(format!("{} has no StudentSBT", profile.name)));
        }
        let voting_power = sbt.voting_power_tenths(address).await? as f64 / 10.0;
        if voting_power != profile.voting_power() {
            return Err(EndaomentError::Scenario(format!(
                "{} has voting power {voting_power}, expected {}",
                profile.name,
                profile.voting_power()
            )));
        }
        students.push(StudentSummary {
            address,
            name: profile.name,
            voting_power,
        });
    }

    Ok(FullFlowSummary {
        donor,
        donated: format::parse_usdc(DONATION)?,
        yield_injected: format::parse_usdc(INJECTED_YIELD)?,
        university_wallet,
        university_received,
        treasury,
        treasury_received,
        students,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::sim::SimChain;

    async fn context(dir: &std::path::Path) -> DeployContext {
        let chain: Arc<dyn Chain> = Arc::new(SimChain::new());
        let accounts = chain.accounts().await.unwrap();
        DeployContext {
            chain,
            pool: db::init_pool("sqlite::memory:").await.unwrap(),
            deployer: accounts[0],
            university_wallet: accounts[0],
            wallets_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn target_precedence() {
        let flag = Address([1; 20]);
        let env = Address([2; 20]);
        assert_eq!(resolve_target(Some(flag), Some(env)).unwrap(), flag);
        assert_eq!(resolve_target(None, Some(env)).unwrap(), env);
        assert_eq!(resolve_target(None, None).unwrap().to_string(), DEFAULT_TARGET);
    }

    #[tokio::test]
    async fn owner_mints_the_shortfall() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let contracts = deploy::ensure_deployed(&ctx).await.unwrap();
        let target = resolve_target(None, None).unwrap();

        let summary = transfer_usdc(&ctx.chain, &contracts, ctx.deployer, target, DEFAULT_TRANSFER)
            .await
            .unwrap();
        assert_eq!(summary.minted, DEFAULT_TRANSFER);
        assert_eq!(summary.recipient_balance, DEFAULT_TRANSFER);
        assert!(summary.tx_hash.starts_with("0x"));
    }

    #[tokio::test]
    async fn others_need_the_balance() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;
        let contracts = deploy::ensure_deployed(&ctx).await.unwrap();
        let accounts = ctx.chain.accounts().await.unwrap();
        let sender = accounts[7];
        contracts.stablecoin(&ctx.chain).unwrap().faucet(sender).await.unwrap();

        let err = transfer_usdc(&ctx.chain, &contracts, sender, accounts[8], DEFAULT_TRANSFER)
            .await
            .unwrap_err();
        assert!(matches!(err, EndaomentError::InsufficientFunds(_)));

        let summary = transfer_usdc(&ctx.chain, &contracts, sender, accounts[8], 100 * USDC_UNIT)
            .await
            .unwrap();
        assert_eq!(summary.minted, 0);
        assert_eq!(summary.recipient_balance, 100 * USDC_UNIT);
    }

    #[tokio::test]
    async fn full_flow_splits_yield_and_mints_sbts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path()).await;

        let summary = full_flow(&ctx).await.unwrap();
        assert_eq!(summary.university_received, 250 * USDC_UNIT);
        assert_eq!(summary.treasury_received, 250 * USDC_UNIT);
        assert_eq!(summary.university_wallet, ctx.deployer);
        let powers: Vec<f64> = summary.students.iter().map(|s| s.voting_power).collect();
        assert_eq!(powers, vec![2.6, 3.0]);
        assert!(summary.to_string().contains("received $250.00"));
    }
}
