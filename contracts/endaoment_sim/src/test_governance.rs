use crate::invariants::assert_voting_power_bounds;
use crate::{voting_power_tenths, Address, Constructor, Error, Ledger, Role};

struct Governance {
    ledger: Ledger,
    deployer: Address,
    sbt: Address,
    governor: Address,
    timelock: Address,
    registry: Address,
}

fn deployed(ledger: &mut Ledger, from: Address, constructor: Constructor) -> Address {
    ledger.deploy(from, constructor).unwrap().contract_address.unwrap()
}

fn setup() -> Governance {
    let mut ledger = Ledger::new();
    let deployer = ledger.accounts()[0];
    let timelock = deployed(
        &mut ledger,
        deployer,
        Constructor::TimelockController {
            min_delay: 3600,
            proposers: vec![],
            executors: vec![Address::ZERO],
            cancellers: vec![],
        },
    );
    let sbt = deployed(
        &mut ledger,
        deployer,
        Constructor::StudentSbt { name: "EnDAOment Student".into(), symbol: "EDS".into() },
    );
    let governor = deployed(
        &mut ledger,
        deployer,
        Constructor::MyGovernor {
            token: sbt,
            timelock,
            voting_delay: 1,
            voting_period: 50_400,
            quorum_percentage: 4,
        },
    );
    ledger.grant_role(deployer, timelock, Role::Proposer, governor).unwrap();

    let registry = deployed(&mut ledger, deployer, Constructor::StudentRegistry);
    ledger.set_student_sbt(deployer, registry, sbt).unwrap();
    ledger.add_authorized_minter(deployer, sbt, registry).unwrap();

    Governance { ledger, deployer, sbt, governor, timelock, registry }
}

#[test]
fn test_voting_power_formula() {
    assert_eq!(voting_power_tenths(0, 0, 0), 10);
    assert_eq!(voting_power_tenths(8, 5, 3), 26);
    assert_eq!(voting_power_tenths(9, 7, 4), 30);
    assert_eq!(voting_power_tenths(20, 20, 20), 40);
    assert_eq!(voting_power_tenths(u32::MAX, 1, 1), 40);
    for tenths in [voting_power_tenths(0, 0, 0), voting_power_tenths(30, 0, 0)] {
        assert_voting_power_bounds(tenths);
    }
}

#[test]
fn test_governor_is_proposer() {
    let g = setup();
    assert!(g.ledger.has_role(g.timelock, Role::Proposer, g.governor).unwrap());
    assert!(g.ledger.has_role(g.timelock, Role::Executor, Address::ZERO).unwrap());
    assert!(g.ledger.has_role(g.timelock, Role::Admin, g.deployer).unwrap());
    assert_eq!(g.ledger.min_delay(g.timelock).unwrap(), 3600);
    assert_eq!(g.ledger.governor_settings(g.governor).unwrap().quorum_percentage, 4);
}

#[test]
fn test_grant_role_needs_admin() {
    let mut g = setup();
    let outsider = g.ledger.accounts()[5];
    let err = g
        .ledger
        .grant_role(outsider, g.timelock, Role::Proposer, outsider)
        .unwrap_err();
    assert_eq!(err, Error::MissingRole);
}

#[test]
fn test_student_registration_mints_sbt_with_votes() {
    let mut g = setup();
    let student = g.ledger.accounts()[4];

    g.ledger
        .register_student(student, g.registry, "Ana", "UNAM", "Physics", "A001", 8, 5, 3)
        .unwrap();

    assert!(g.ledger.is_student_registered(g.registry, student).unwrap());
    assert!(g.ledger.has_sbt(g.sbt, student).unwrap());
    assert_eq!(g.ledger.sbt_voting_power(g.sbt, student).unwrap(), 26);
    assert_eq!(g.ledger.get_votes(g.governor, student).unwrap(), 26);
    assert_eq!(g.ledger.sbt_total_supply(g.sbt).unwrap(), 1);

    let err = g
        .ledger
        .register_student(student, g.registry, "Ana", "UNAM", "Physics", "A001", 8, 5, 3)
        .unwrap_err();
    assert_eq!(err, Error::AlreadyRegistered);
}

#[test]
fn test_student_registration_rejects_empty_fields() {
    let mut g = setup();
    let student = g.ledger.accounts()[4];
    let err = g
        .ledger
        .register_student(student, g.registry, "Ana", "", "Physics", "A001", 0, 0, 0)
        .unwrap_err();
    assert_eq!(err, Error::EmptyField);
    assert!(!g.ledger.has_sbt(g.sbt, student).unwrap());
}

#[test]
fn test_unauthorized_registry_cannot_mint() {
    let mut ledger = Ledger::new();
    let deployer = ledger.accounts()[0];
    let student = ledger.accounts()[1];
    let sbt = deployed(
        &mut ledger,
        deployer,
        Constructor::StudentSbt { name: "S".into(), symbol: "S".into() },
    );
    let registry = deployed(&mut ledger, deployer, Constructor::StudentRegistry);
    ledger.set_student_sbt(deployer, registry, sbt).unwrap();

    let err = ledger
        .register_student(student, registry, "Ana", "UNAM", "Physics", "A001", 1, 1, 1)
        .unwrap_err();
    assert_eq!(err, Error::NotAuthorizedMinter);
    assert!(!ledger.is_student_registered(registry, student).unwrap());
}

#[test]
fn test_sbt_is_soulbound() {
    let mut g = setup();
    let student = g.ledger.accounts()[4];
    g.ledger
        .register_student(student, g.registry, "Ana", "UNAM", "Physics", "A001", 0, 0, 0)
        .unwrap();
    let err = g.ledger.transfer_sbt(student, g.sbt, g.deployer).unwrap_err();
    assert_eq!(err, Error::Soulbound);
}
