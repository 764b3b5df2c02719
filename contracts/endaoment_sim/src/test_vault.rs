use crate::invariants::{assert_pool_solvent, assert_split, assert_supply_conserved, assert_vault_backed};
use crate::{Address, Constructor, Error, Event, Ledger, FAUCET_AMOUNT};

const USDC: u128 = 1_000_000;

struct Suite {
    ledger: Ledger,
    deployer: Address,
    donor: Address,
    university: Address,
    usdc: Address,
    pool: Address,
    timelock: Address,
    splitter: Address,
    vault: Address,
}

fn deployed(ledger: &mut Ledger, from: Address, constructor: Constructor) -> Address {
    ledger.deploy(from, constructor).unwrap().contract_address.unwrap()
}

fn setup() -> Suite {
    let mut ledger = Ledger::new();
    let deployer = ledger.accounts()[0];
    let donor = ledger.accounts()[1];
    let university = ledger.accounts()[2];

    let usdc = deployed(&mut ledger, deployer, Constructor::MockUsdc);
    let pool = deployed(&mut ledger, deployer, Constructor::MockAavePool { asset: usdc });
    ledger.add_minter(deployer, usdc, pool).unwrap();
    let timelock = deployed(
        &mut ledger,
        deployer,
        Constructor::TimelockController {
            min_delay: 3600,
            proposers: vec![],
            executors: vec![Address::ZERO],
            cancellers: vec![university],
        },
    );
    let splitter = deployed(
        &mut ledger,
        deployer,
        Constructor::YieldSplitter { asset: usdc, university_wallet: university, timelock },
    );
    let vault = deployed(
        &mut ledger,
        deployer,
        Constructor::LosslessVault {
            asset: usdc,
            name: "EnDAOment Vault".into(),
            symbol: "edUSDC".into(),
            pool,
            splitter,
        },
    );

    Suite { ledger, deployer, donor, university, usdc, pool, timelock, splitter, vault }
}

fn holders(s: &Suite) -> Vec<Address> {
    vec![s.deployer, s.donor, s.university, s.pool, s.timelock, s.splitter, s.vault]
}

#[test]
fn test_faucet_mints_ten_thousand() {
    let mut s = setup();
    s.ledger.faucet(s.donor, s.usdc).unwrap();
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), 10_000 * USDC);
    assert_eq!(FAUCET_AMOUNT, 10_000 * USDC);
}

#[test]
fn test_deposit_harvest_withdraw_round_trip() {
    let mut s = setup();
    s.ledger.faucet(s.donor, s.usdc).unwrap();
    s.ledger.approve(s.donor, s.usdc, s.vault, 5_000 * USDC).unwrap();
    s.ledger.deposit(s.donor, s.vault, 5_000 * USDC, s.donor).unwrap();

    assert_eq!(s.ledger.vault_balance_of(s.vault, s.donor).unwrap(), 5_000 * USDC);
    assert_eq!(s.ledger.pool_principal(s.pool).unwrap(), 5_000 * USDC);
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), 5_000 * USDC);
    assert_vault_backed(&s.ledger, s.vault, s.pool);

    s.ledger.admin_add_yield(s.deployer, s.pool, 500 * USDC).unwrap();
    assert_eq!(s.ledger.available_yield(s.pool).unwrap(), 500 * USDC);
    assert_pool_solvent(&s.ledger, s.pool);

    s.ledger.harvest_yield(s.donor, s.vault).unwrap();
    let university = s.ledger.balance_of(s.usdc, s.university).unwrap();
    let dao = s.ledger.balance_of(s.usdc, s.timelock).unwrap();
    assert_eq!(university, 250 * USDC);
    assert_eq!(dao, 250 * USDC);
    assert_split(university, dao, 500 * USDC);
    assert_eq!(s.ledger.available_yield(s.pool).unwrap(), 0);

    s.ledger
        .withdraw(s.donor, s.vault, 5_000 * USDC, s.donor, s.donor)
        .unwrap();
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), 10_000 * USDC);
    assert_eq!(s.ledger.vault_balance_of(s.vault, s.donor).unwrap(), 0);
    assert_eq!(s.ledger.vault_total_harvested(s.vault).unwrap(), 500 * USDC);
    assert_supply_conserved(&s.ledger, s.usdc, &holders(&s));
}

#[test]
fn test_odd_yield_gives_remainder_to_dao() {
    let mut s = setup();
    s.ledger.faucet(s.donor, s.usdc).unwrap();
    s.ledger.approve(s.donor, s.usdc, s.vault, 100).unwrap();
    s.ledger.deposit(s.donor, s.vault, 100, s.donor).unwrap();
    s.ledger.admin_add_yield(s.deployer, s.pool, 7).unwrap();
    s.ledger.harvest_yield(s.deployer, s.vault).unwrap();

    assert_eq!(s.ledger.balance_of(s.usdc, s.university).unwrap(), 3);
    assert_eq!(s.ledger.balance_of(s.usdc, s.timelock).unwrap(), 4);
}

#[test]
fn test_deposit_without_allowance_reverts_atomically() {
    let mut s = setup();
    s.ledger.faucet(s.donor, s.usdc).unwrap();
    let block = s.ledger.block_number();

    let err = s.ledger.deposit(s.donor, s.vault, USDC, s.donor).unwrap_err();
    assert_eq!(err, Error::InsufficientAllowance);
    assert_eq!(s.ledger.block_number(), block);
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), FAUCET_AMOUNT);
    assert_eq!(s.ledger.pool_principal(s.pool).unwrap(), 0);
}

#[test]
fn test_deposit_more_than_balance_reverts() {
    let mut s = setup();
    s.ledger.approve(s.donor, s.usdc, s.vault, USDC).unwrap();
    let err = s.ledger.deposit(s.donor, s.vault, USDC, s.donor).unwrap_err();
    assert_eq!(err, Error::InsufficientBalance);
    // allowance restored along with everything else
    assert_eq!(s.ledger.allowance(s.usdc, s.donor, s.vault).unwrap(), USDC);
}

#[test]
fn test_zero_deposit_rejected() {
    let mut s = setup();
    let err = s.ledger.deposit(s.donor, s.vault, 0, s.donor).unwrap_err();
    assert_eq!(err, Error::ZeroAmount);
}

#[test]
fn test_withdraw_more_than_shares_reverts() {
    let mut s = setup();
    s.ledger.faucet(s.donor, s.usdc).unwrap();
    s.ledger.approve(s.donor, s.usdc, s.vault, 10 * USDC).unwrap();
    s.ledger.deposit(s.donor, s.vault, 10 * USDC, s.donor).unwrap();

    let err = s
        .ledger
        .withdraw(s.donor, s.vault, 11 * USDC, s.donor, s.donor)
        .unwrap_err();
    assert_eq!(err, Error::InsufficientShares);

    let err = s
        .ledger
        .withdraw(s.deployer, s.vault, USDC, s.deployer, s.donor)
        .unwrap_err();
    assert_eq!(err, Error::NotShareOwner);
}

#[test]
fn test_harvest_without_yield_reverts() {
    let mut s = setup();
    let err = s.ledger.harvest_yield(s.donor, s.vault).unwrap_err();
    assert_eq!(err, Error::NoYieldAvailable);
}

#[test]
fn test_add_yield_is_owner_only() {
    let mut s = setup();
    let err = s.ledger.admin_add_yield(s.donor, s.pool, USDC).unwrap_err();
    assert_eq!(err, Error::NotOwner);
}

#[test]
fn test_add_yield_requires_pool_minter() {
    let mut ledger = Ledger::new();
    let deployer = ledger.accounts()[0];
    let usdc = deployed(&mut ledger, deployer, Constructor::MockUsdc);
    let pool = deployed(&mut ledger, deployer, Constructor::MockAavePool { asset: usdc });
    let err = ledger.admin_add_yield(deployer, pool, USDC).unwrap_err();
    assert_eq!(err, Error::NotMinter);
}

#[test]
fn test_mint_requires_owner_or_minter() {
    let mut s = setup();
    let err = s.ledger.mint(s.donor, s.usdc, s.donor, USDC).unwrap_err();
    assert_eq!(err, Error::NotMinter);
    s.ledger.mint(s.deployer, s.usdc, s.donor, USDC).unwrap();
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), USDC);
}

#[test]
fn test_receipts_mine_one_block_each() {
    let mut s = setup();
    let before = s.ledger.block_number();
    let receipt = s.ledger.faucet(s.donor, s.usdc).unwrap();
    assert_eq!(receipt.block_number, before + 1);
    assert_eq!(receipt.from, s.donor);
    assert_eq!(receipt.to, Some(s.usdc));
    assert!(matches!(receipt.logs[0].1, Event::Transfer { value, .. } if value == FAUCET_AMOUNT));
}

#[test]
fn test_calling_wrong_contract_kind_reverts() {
    let mut s = setup();
    let err = s.ledger.faucet(s.donor, s.vault).unwrap_err();
    assert!(matches!(err, Error::WrongContract { .. }));
    let err = s.ledger.balance_of(Address::ZERO, s.donor).unwrap_err();
    assert_eq!(err, Error::UnknownContract);
}

#[test]
fn test_share_math_overflow_reverts() {
    let mut s = setup();
    let huge = 1u128 << 65;
    s.ledger.mint(s.deployer, s.usdc, s.donor, 2 * huge).unwrap();
    s.ledger.approve(s.donor, s.usdc, s.vault, 2 * huge).unwrap();
    s.ledger.deposit(s.donor, s.vault, huge, s.donor).unwrap();
    let block = s.ledger.block_number();

    let err = s.ledger.deposit(s.donor, s.vault, huge, s.donor).unwrap_err();
    assert_eq!(err, Error::Overflow);
    assert_eq!(err.code(), 20);
    assert_eq!(s.ledger.block_number(), block);
    assert_eq!(s.ledger.balance_of(s.usdc, s.donor).unwrap(), huge);
    assert_eq!(s.ledger.vault_total_supply(s.vault).unwrap(), huge);
    assert_eq!(s.ledger.convert_to_shares(s.vault, huge).unwrap_err(), Error::Overflow);
    assert_eq!(s.ledger.convert_to_assets(s.vault, huge).unwrap_err(), Error::Overflow);

    let err = s.ledger.withdraw(s.donor, s.vault, huge, s.donor, s.donor).unwrap_err();
    assert_eq!(err, Error::Overflow);
    assert_vault_backed(&s.ledger, s.vault, s.pool);
}

#[test]
fn test_supply_overflow_reverts() {
    let mut s = setup();
    s.ledger.mint(s.deployer, s.usdc, s.donor, u128::MAX).unwrap();

    let err = s.ledger.mint(s.deployer, s.usdc, s.university, 1).unwrap_err();
    assert_eq!(err, Error::Overflow);
    assert_eq!(s.ledger.total_supply(s.usdc).unwrap(), u128::MAX);
    assert_eq!(s.ledger.balance_of(s.usdc, s.university).unwrap(), 0);

    let err = s.ledger.faucet(s.university, s.usdc).unwrap_err();
    assert_eq!(err, Error::Overflow);
}
