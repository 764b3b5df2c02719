use crate::{Address, Constructor, Error, Ledger};

fn deployed(ledger: &mut Ledger, from: Address, constructor: Constructor) -> Address {
    ledger.deploy(from, constructor).unwrap().contract_address.unwrap()
}

fn wallet(n: u8) -> Address {
    Address([n; 20])
}

#[test]
fn test_university_registration_and_lock() {
    let mut ledger = Ledger::new();
    let owner = ledger.accounts()[0];
    let registry = deployed(&mut ledger, owner, Constructor::UniversityRegistry);

    ledger.register_university(owner, registry, "unam", "UNAM", wallet(1)).unwrap();
    assert!(ledger.is_university_registered(registry, "unam").unwrap());
    assert!(!ledger.is_university_registered(registry, "tec").unwrap());

    ledger.set_university_wallet(owner, registry, "unam", wallet(2)).unwrap();
    ledger.lock_university_wallet(owner, registry, "unam").unwrap();

    let entry = ledger.university(registry, "unam").unwrap().unwrap();
    assert_eq!(entry.wallet, wallet(2));
    assert!(entry.locked);

    let err = ledger
        .set_university_wallet(owner, registry, "unam", wallet(3))
        .unwrap_err();
    assert_eq!(err, Error::WalletLocked);
}

#[test]
fn test_duplicate_university_rejected() {
    let mut ledger = Ledger::new();
    let owner = ledger.accounts()[0];
    let registry = deployed(&mut ledger, owner, Constructor::UniversityRegistry);

    ledger.register_university(owner, registry, "unam", "UNAM", wallet(1)).unwrap();
    let err = ledger
        .register_university(owner, registry, "unam", "UNAM", wallet(1))
        .unwrap_err();
    assert_eq!(err, Error::AlreadyRegistered);
    assert_eq!(ledger.university_count(registry).unwrap(), 1);
}

#[test]
fn test_registration_open_but_locking_owner_only() {
    let mut ledger = Ledger::new();
    let owner = ledger.accounts()[0];
    let outsider = ledger.accounts()[3];
    let registry = deployed(&mut ledger, owner, Constructor::UniversityRegistry);

    ledger
        .register_university(outsider, registry, "buap", "BUAP", outsider)
        .unwrap();
    let err = ledger.lock_university_wallet(outsider, registry, "buap").unwrap_err();
    assert_eq!(err, Error::NotOwner);
    let err = ledger.lock_university_wallet(owner, registry, "ghost").unwrap_err();
    assert_eq!(err, Error::NotRegistered);
}

#[test]
fn test_tracker_aggregates_per_university() {
    let mut ledger = Ledger::new();
    let owner = ledger.accounts()[0];
    let tracker = deployed(&mut ledger, owner, Constructor::DonationTracker);

    ledger.tracker_register_university(owner, tracker, wallet(1), "UNAM").unwrap();
    let err = ledger
        .tracker_register_university(owner, tracker, wallet(1), "UNAM")
        .unwrap_err();
    assert_eq!(err, Error::AlreadyRegistered);

    ledger.record_donation(owner, tracker, wallet(1), 100).unwrap();
    ledger.record_donation(owner, tracker, wallet(1), 50).unwrap();
    ledger.record_yield(owner, tracker, wallet(1), 7).unwrap();

    assert_eq!(ledger.total_donations(tracker, wallet(1)).unwrap(), 150);
    assert_eq!(ledger.total_yield_distributed(tracker, wallet(1)).unwrap(), 7);
    assert_eq!(ledger.total_donations(tracker, wallet(9)).unwrap(), 0);

    let err = ledger.record_donation(owner, tracker, wallet(9), 1).unwrap_err();
    assert_eq!(err, Error::NotRegistered);
}
