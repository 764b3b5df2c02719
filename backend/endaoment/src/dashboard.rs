//! Read-only dashboard views over the deployed contracts.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::abi::Address;
use crate::chain::Chain;
use crate::contracts::ContractRegistry;
use crate::errors::Result;
use crate::format::{self, Projection, FIXED_APY, USDC_UNIT};
use crate::universities::University;

fn usd(amount: u128) -> String {
    format!("${}", format::format_usdc_with_commas(amount))
}

fn usd_f64(amount: f64) -> String {
    usd((amount * USDC_UNIT as f64).round() as u128)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorDashboard {
    pub account: Address,
    /// Stablecoin available to donate
    pub available: u128,
    pub shares: u128,
    /// Principal the shares are worth
    pub principal: u128,
    pub apy: f64,
    pub projections: Vec<Projection>,
}

pub async fn donor(chain: &Arc<dyn Chain>, contracts: &ContractRegistry, account: Address) -> Result<DonorDashboard> {
    let stablecoin = contracts.stablecoin(chain)?;
    let vault = contracts.vault(chain)?;

    let available = stablecoin.balance_of(account).await?;
    let shares = vault.balance_of(account).await?;
    let principal = vault.convert_to_assets(shares).await?;

    Ok(DonorDashboard {
        account,
        available,
        shares,
        principal,
        apy: FIXED_APY,
        projections: format::calculate_projections(format::usdc_to_f64(principal), FIXED_APY),
    })
}

impl fmt::Display for DonorDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Donor {}", self.account)?;
        writeln!(f, "  Available USDC:      {}", usd(self.available))?;
        writeln!(f, "  Principal deposited: {}", usd(self.principal))?;
        writeln!(f, "  Vault shares:        {}", self.shares)?;
        writeln!(f, "  Projected yield at {:.0}% APY:", self.apy * 100.0)?;
        for p in &self.projections {
            writeln!(
                f,
                "    {:<9} {:>4}d  +{:<14} total {}",
                p.period,
                p.days,
                usd_f64(p.yield_amount),
                usd_f64(p.total)
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityDashboard {
    pub id: &'static str,
    pub name: &'static str,
    pub wallet: Address,
    pub total_donations: u128,
    pub total_yield: u128,
    pub wallet_balance: u128,
    pub capital_goal: u128,
    /// Share of the capital goal raised, capped at 100
    pub progress_percent: f64,
}

pub async fn university(
    chain: &Arc<dyn Chain>,
    contracts: &ContractRegistry,
    university: &University,
    wallet: Address,
) -> Result<UniversityDashboard> {
    let tracker = contracts.donation_tracker(chain)?;
    let stablecoin = contracts.stablecoin(chain)?;

    let total_donations = tracker.total_donations(wallet).await?;
    let total_yield = tracker.total_yield_distributed(wallet).await?;
    let wallet_balance = stablecoin.balance_of(wallet).await?;
    let capital_goal = university.capital_goal_units();

    Ok(UniversityDashboard {
        id: university.id,
        name: university.name,
        wallet,
        total_donations,
        total_yield,
        wallet_balance,
        capital_goal,
        progress_percent: progress(total_donations, capital_goal),
    })
}

fn progress(raised: u128, goal: u128) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    (raised as f64 / goal as f64 * 100.0).min(100.0)
}

impl fmt::Display for UniversityDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.name, self.wallet)?;
        writeln!(
            f,
            "  Capital raised:  {} of {} ({:.1}%)",
            usd(self.total_donations),
            usd(self.capital_goal),
            self.progress_percent
        )?;
        writeln!(f, "  Yield received:  {}", usd(self.total_yield))?;
        writeln!(f, "  Wallet balance:  {}", usd(self.wallet_balance))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDashboard {
    /// Principal supplied to the pool
    pub principal: u128,
    pub available_yield: u128,
    pub total_assets: u128,
    pub vault_total_assets: u128,
    pub vault_total_shares: u128,
}

pub async fn pool(chain: &Arc<dyn Chain>, contracts: &ContractRegistry) -> Result<PoolDashboard> {
    let pool = contracts.yield_pool(chain)?;
    let vault = contracts.vault(chain)?;

    Ok(PoolDashboard {
        principal: pool.principal().await?,
        available_yield: pool.available_yield().await?,
        total_assets: pool.total_assets().await?,
        vault_total_assets: vault.total_assets().await?,
        vault_total_shares: vault.total_supply().await?,
    })
}

impl fmt::Display for PoolDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Yield pool")?;
        writeln!(f, "  Principal supplied: {}", usd(self.principal))?;
        writeln!(f, "  Available yield:    {}", usd(self.available_yield))?;
        writeln!(f, "  Total assets:       {}", usd(self.total_assets))?;
        writeln!(f, "Vault")?;
        writeln!(f, "  Total assets:       {}", usd(self.vault_total_assets))?;
        writeln!(f, "  Total shares:       {}", self.vault_total_shares)
    }
}
