#![allow(dead_code)]

use crate::{Address, Ledger};

/// INV-1: Vault principal is always fully backed by the pool's supplied principal.
pub fn assert_vault_backed(ledger: &Ledger, vault: Address, pool: Address) {
    let principal = ledger.vault_total_assets(vault).unwrap();
    let supplied = ledger.pool_principal(pool).unwrap();
    assert!(
        supplied >= principal,
        "INV-1 violated: vault principal {} exceeds pool principal {}",
        principal,
        supplied
    );
}

/// INV-2: Pool holds at least its principal; yield is never negative.
pub fn assert_pool_solvent(ledger: &Ledger, pool: Address) {
    let assets = ledger.pool_total_assets(pool).unwrap();
    let principal = ledger.pool_principal(pool).unwrap();
    assert!(
        assets >= principal,
        "INV-2 violated: pool assets {} below principal {}",
        assets,
        principal
    );
}

/// INV-3: A harvest of `amount` pays the university exactly half (rounded
/// down) and the DAO the remainder.
pub fn assert_split(university_delta: u128, dao_delta: u128, amount: u128) {
    assert_eq!(
        university_delta,
        amount / 2,
        "INV-3 violated: university received {} of {}",
        university_delta,
        amount
    );
    assert_eq!(
        university_delta + dao_delta,
        amount,
        "INV-3 violated: split {} + {} != {}",
        university_delta,
        dao_delta,
        amount
    );
}

/// INV-4: Token supply equals the sum of the supplied balances.
pub fn assert_supply_conserved(ledger: &Ledger, token: Address, holders: &[Address]) {
    let sum: u128 = holders
        .iter()
        .map(|h| ledger.balance_of(token, *h).unwrap())
        .sum();
    assert_eq!(
        ledger.total_supply(token).unwrap(),
        sum,
        "INV-4 violated: total supply differs from holder balances"
    );
}

/// INV-5: Voting power stays within 1.0..=4.0 votes.
pub fn assert_voting_power_bounds(tenths: u32) {
    assert!(
        (10..=40).contains(&tenths),
        "INV-5 violated: voting power {} tenths out of bounds",
        tenths
    );
}
