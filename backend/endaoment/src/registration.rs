//! University registration pass run after the registries are deployed.
//!
//! The fixed university list is joined with the wallet key file by id.
//! Entries without a usable wallet are skipped with a warning and never block
//! the others; a failed transaction aborts the pass.

use serde::Serialize;
use tracing::{info, warn};

use crate::abi::Address;
use crate::contracts::{DonationTracker, UniversityRegistry};
use crate::errors::Result;
use crate::universities::UNIVERSITIES;
use crate::wallets::UniversityWallet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationSummary {
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
}

/// `(id, name, wallet)` for every university with a wallet entry.
fn pair_with_wallets(
    wallets: Option<&[UniversityWallet]>,
    summary: &mut RegistrationSummary,
) -> Vec<(&'static str, &'static str, Address)> {
    let Some(wallets) = wallets else {
        warn!(".university-wallets.json not found. Run `endaoment wallets generate` first.");
        summary.skipped = UNIVERSITIES.iter().map(|u| u.id.to_string()).collect();
        return Vec::new();
    };

    let mut pairs = Vec::new();
    for university in UNIVERSITIES {
        let Some(wallet) = wallets.iter().find(|w| w.id == university.id) else {
            warn!("Wallet not found for {}", university.name);
            summary.skipped.push(university.id.to_string());
            continue;
        };
        match wallet.address() {
            Ok(address) => pairs.push((university.id, university.name, address)),
            Err(e) => {
                warn!("Skipping {}: {e}", university.name);
                summary.skipped.push(university.id.to_string());
            }
        }
    }
    pairs
}

/// Register each university in the governance registry, then lock its wallet.
pub async fn register_in_registry(
    registry: &UniversityRegistry,
    from: Address,
    wallets: Option<&[UniversityWallet]>,
) -> Result<RegistrationSummary> {
    let mut summary = RegistrationSummary::default();

    for (id, name, wallet) in pair_with_wallets(wallets, &mut summary) {
        info!("Registering {name}...");
        registry.register_university(from, id, name, wallet).await?;
        registry.lock_university_wallet(from, id).await?;
        info!("{name} registered and locked (id {id}, wallet {wallet})");
        summary.registered.push(id.to_string());
    }

    info!(
        "UniversityRegistry at {}: {} registered, {} skipped",
        registry.address,
        summary.registered.len(),
        summary.skipped.len()
    );
    Ok(summary)
}

/// Register each university wallet in the donation tracker.
pub async fn register_in_tracker(
    tracker: &DonationTracker,
    from: Address,
    wallets: Option<&[UniversityWallet]>,
) -> Result<RegistrationSummary> {
    let mut summary = RegistrationSummary::default();

    for (id, name, wallet) in pair_with_wallets(wallets, &mut summary) {
        tracker.register_university(from, wallet, name).await?;
        info!("{name} registered in DonationTracker");
        summary.registered.push(id.to_string());
    }

    info!(
        "DonationTracker at {}: {} registered, {} skipped",
        tracker.address,
        summary.registered.len(),
        summary.skipped.len()
    );
    Ok(summary)
}
