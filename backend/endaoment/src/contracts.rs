//! Typed contract registry.
//!
//! [`ContractId`] is the closed set of deployable contracts. A
//! [`ContractRegistry`] is loaded once from the deployment record store and
//! hands out typed handles, so nothing downstream resolves contracts by
//! free-form string.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::debug;

use crate::abi::{Address, ParamType, Token};
use crate::chain::{Chain, FunctionCall, TxReceipt};
use crate::db;
use crate::errors::{EndaomentError, Result};
use crate::student::StudentProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractId {
    MockUsdc,
    MockAavePool,
    TimelockController,
    YieldSplitter,
    StudentSbt,
    MyGovernor,
    LosslessVault,
    UniversityRegistry,
    DonationTracker,
    StudentRegistry,
}

impl ContractId {
    pub const ALL: [ContractId; 10] = [
        ContractId::MockUsdc,
        ContractId::MockAavePool,
        ContractId::TimelockController,
        ContractId::YieldSplitter,
        ContractId::StudentSbt,
        ContractId::MyGovernor,
        ContractId::LosslessVault,
        ContractId::UniversityRegistry,
        ContractId::DonationTracker,
        ContractId::StudentRegistry,
    ];

    /// Artifact and deployment record name.
    pub fn name(&self) -> &'static str {
        match self {
            ContractId::MockUsdc => "MockUSDC",
            ContractId::MockAavePool => "MockAavePool",
            ContractId::TimelockController => "TimelockController",
            ContractId::YieldSplitter => "YieldSplitter",
            ContractId::StudentSbt => "StudentSBT",
            ContractId::MyGovernor => "MyGovernor",
            ContractId::LosslessVault => "LosslessVault",
            ContractId::UniversityRegistry => "UniversityRegistry",
            ContractId::DonationTracker => "DonationTracker",
            ContractId::StudentRegistry => "StudentRegistry",
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContractId {
    type Err = EndaomentError;

    fn from_str(s: &str) -> Result<Self> {
        ContractId::ALL
            .into_iter()
            .find(|id| id.name() == s)
            .ok_or_else(|| EndaomentError::Config(format!("unknown contract name: {s}")))
    }
}

// ─────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContractRegistry {
    network: String,
    addresses: HashMap<ContractId, Address>,
}

impl ContractRegistry {
    pub fn new(network: impl Into<String>) -> Self {
        ContractRegistry {
            network: network.into(),
            addresses: HashMap::new(),
        }
    }

    /// Populate from every deployment record of `network`. Records whose
    /// name is not a known contract are ignored.
    pub async fn load(pool: &SqlitePool, network: &str) -> Result<Self> {
        let mut registry = ContractRegistry::new(network);
        for record in db::list_deployments(pool, network).await? {
            let Ok(id) = record.name.parse::<ContractId>() else {
                debug!("Ignoring unknown deployment record {}", record.name);
                continue;
            };
            let address = record.address.parse().map_err(|_| {
                EndaomentError::Config(format!("bad address in record {}: {}", record.name, record.address))
            })?;
            registry.addresses.insert(id, address);
        }
        Ok(registry)
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn insert(&mut self, id: ContractId, address: Address) {
        self.addresses.insert(id, address);
    }

    pub fn address(&self, id: ContractId) -> Result<Address> {
        self.addresses
            .get(&id)
            .copied()
            .ok_or_else(|| EndaomentError::MissingDeployment {
                network: self.network.clone(),
                name: id.name().to_string(),
            })
    }

    pub fn stablecoin(&self, chain: &Arc<dyn Chain>) -> Result<Stablecoin> {
        Ok(Stablecoin::new(chain.clone(), self.address(ContractId::MockUsdc)?))
    }

    pub fn yield_pool(&self, chain: &Arc<dyn Chain>) -> Result<YieldPool> {
        Ok(YieldPool::new(chain.clone(), self.address(ContractId::MockAavePool)?))
    }

    pub fn timelock(&self, chain: &Arc<dyn Chain>) -> Result<Timelock> {
        Ok(Timelock::new(chain.clone(), self.address(ContractId::TimelockController)?))
    }

    pub fn splitter(&self, chain: &Arc<dyn Chain>) -> Result<Splitter> {
        Ok(Splitter::new(chain.clone(), self.address(ContractId::YieldSplitter)?))
    }

    pub fn soulbound_token(&self, chain: &Arc<dyn Chain>) -> Result<SoulboundToken> {
        Ok(SoulboundToken::new(chain.clone(), self.address(ContractId::StudentSbt)?))
    }

    pub fn vault(&self, chain: &Arc<dyn Chain>) -> Result<Vault> {
        Ok(Vault::new(chain.clone(), self.address(ContractId::LosslessVault)?))
    }

    pub fn university_registry(&self, chain: &Arc<dyn Chain>) -> Result<UniversityRegistry> {
        Ok(UniversityRegistry::new(chain.clone(), self.address(ContractId::UniversityRegistry)?))
    }

    pub fn donation_tracker(&self, chain: &Arc<dyn Chain>) -> Result<DonationTracker> {
        Ok(DonationTracker::new(chain.clone(), self.address(ContractId::DonationTracker)?))
    }

    pub fn student_registry(&self, chain: &Arc<dyn Chain>) -> Result<StudentRegistry> {
        Ok(StudentRegistry::new(chain.clone(), self.address(ContractId::StudentRegistry)?))
    }
}

// ─────────────────────────────────────────────────────────
// Typed handles
// ─────────────────────────────────────────────────────────

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            chain: Arc<dyn Chain>,
            pub address: Address,
        }

        #[allow(dead_code)]
        impl $name {
            pub fn new(chain: Arc<dyn Chain>, address: Address) -> Self {
                $name { chain, address }
            }

            async fn send(&self, from: Address, signature: &'static str, args: Vec<Token>) -> Result<TxReceipt> {
                self.chain
                    .send(from, self.address, &FunctionCall::new(signature, args))
                    .await
            }

            async fn read(
                &self,
                signature: &'static str,
                args: Vec<Token>,
                returns: Vec<ParamType>,
            ) -> Result<Vec<Token>> {
                self.chain
                    .call(self.address, &FunctionCall::new(signature, args).returning(returns))
                    .await
            }

            async fn read_uint(&self, signature: &'static str, args: Vec<Token>) -> Result<u128> {
                let tokens = self.read(signature, args, vec![ParamType::Uint]).await?;
                single(tokens, signature, Token::into_uint)
            }

            async fn read_bool(&self, signature: &'static str, args: Vec<Token>) -> Result<bool> {
                let tokens = self.read(signature, args, vec![ParamType::Bool]).await?;
                single(tokens, signature, Token::into_bool)
            }

            async fn read_address(&self, signature: &'static str, args: Vec<Token>) -> Result<Address> {
                let tokens = self.read(signature, args, vec![ParamType::Address]).await?;
                single(tokens, signature, Token::into_address)
            }
        }
    };
}

fn single<T>(tokens: Vec<Token>, signature: &str, extract: fn(Token) -> Option<T>) -> Result<T> {
    tokens
        .into_iter()
        .next()
        .and_then(extract)
        .ok_or_else(|| EndaomentError::Abi(format!("unexpected return value from {signature}")))
}

handle!(
    /// `MockUSDC`
    Stablecoin
);

impl Stablecoin {
    pub async fn balance_of(&self, who: Address) -> Result<u128> {
        self.read_uint("balanceOf(address)", vec![Token::Address(who)]).await
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<u128> {
        self.read_uint(
            "allowance(address,address)",
            vec![Token::Address(owner), Token::Address(spender)],
        )
        .await
    }

    pub async fn total_supply(&self) -> Result<u128> {
        self.read_uint("totalSupply()", vec![]).await
    }

    pub async fn owner(&self) -> Result<Address> {
        self.read_address("owner()", vec![]).await
    }

    pub async fn is_minter(&self, who: Address) -> Result<bool> {
        self.read_bool("minters(address)", vec![Token::Address(who)]).await
    }

    pub async fn approve(&self, from: Address, spender: Address, amount: u128) -> Result<TxReceipt> {
        self.send(
            from,
            "approve(address,uint256)",
            vec![Token::Address(spender), Token::Uint(amount)],
        )
        .await
    }

    pub async fn transfer(&self, from: Address, to: Address, amount: u128) -> Result<TxReceipt> {
        self.send(
            from,
            "transfer(address,uint256)",
            vec![Token::Address(to), Token::Uint(amount)],
        )
        .await
    }

    pub async fn mint(&self, from: Address, to: Address, amount: u128) -> Result<TxReceipt> {
        self.send(
            from,
            "mint(address,uint256)",
            vec![Token::Address(to), Token::Uint(amount)],
        )
        .await
    }

    pub async fn add_minter(&self, from: Address, minter: Address) -> Result<TxReceipt> {
        self.send(from, "addMinter(address)", vec![Token::Address(minter)]).await
    }

    pub async fn faucet(&self, from: Address) -> Result<TxReceipt> {
        self.send(from, "faucet()", vec![]).await
    }
}

handle!(
    /// `MockAavePool`
    YieldPool
);

impl YieldPool {
    /// Principal supplied by depositors.
    pub async fn principal(&self) -> Result<u128> {
        self.read_uint("totalSupply()", vec![]).await
    }

    pub async fn available_yield(&self) -> Result<u128> {
        self.read_uint("getAvailableYield()", vec![]).await
    }

    pub async fn total_assets(&self) -> Result<u128> {
        self.read_uint("getTotalAssets()", vec![]).await
    }

    pub async fn admin_add_yield(&self, from: Address, amount: u128) -> Result<TxReceipt> {
        self.send(from, "adminAddYield(uint256)", vec![Token::Uint(amount)]).await
    }
}

handle!(
    /// `TimelockController`
    Timelock
);

impl Timelock {
    pub async fn proposer_role(&self) -> Result<[u8; 32]> {
        let tokens = self.read("PROPOSER_ROLE()", vec![], vec![ParamType::Bytes32]).await?;
        single(tokens, "PROPOSER_ROLE()", Token::into_bytes32)
    }

    pub async fn grant_role(&self, from: Address, role: [u8; 32], account: Address) -> Result<TxReceipt> {
        self.send(
            from,
            "grantRole(bytes32,address)",
            vec![Token::Bytes32(role), Token::Address(account)],
        )
        .await
    }

    pub async fn has_role(&self, role: [u8; 32], account: Address) -> Result<bool> {
        self.read_bool(
            "hasRole(bytes32,address)",
            vec![Token::Bytes32(role), Token::Address(account)],
        )
        .await
    }
}

handle!(
    /// `YieldSplitter`
    Splitter
);

impl Splitter {
    pub async fn university_wallet(&self) -> Result<Address> {
        self.read_address("universityWallet()", vec![]).await
    }

    pub async fn timelock(&self) -> Result<Address> {
        self.read_address("timelockController()", vec![]).await
    }
}

handle!(
    /// `StudentSBT`
    SoulboundToken
);

impl SoulboundToken {
    pub async fn add_authorized_minter(&self, from: Address, minter: Address) -> Result<TxReceipt> {
        self.send(from, "addAuthorizedMinter(address)", vec![Token::Address(minter)])
            .await
    }

    pub async fn has_sbt(&self, who: Address) -> Result<bool> {
        self.read_bool("hasSBT(address)", vec![Token::Address(who)]).await
    }

    /// Voting power in tenths of a vote.
    pub async fn voting_power_tenths(&self, who: Address) -> Result<u128> {
        self.read_uint("votingPower(address)", vec![Token::Address(who)]).await
    }
}

handle!(
    /// `LosslessVault` (ERC4626-style shares)
    Vault
);

impl Vault {
    pub async fn deposit(&self, from: Address, assets: u128, receiver: Address) -> Result<TxReceipt> {
        self.send(
            from,
            "deposit(uint256,address)",
            vec![Token::Uint(assets), Token::Address(receiver)],
        )
        .await
    }

    pub async fn withdraw(
        &self,
        from: Address,
        assets: u128,
        receiver: Address,
        owner: Address,
    ) -> Result<TxReceipt> {
        self.send(
            from,
            "withdraw(uint256,address,address)",
            vec![Token::Uint(assets), Token::Address(receiver), Token::Address(owner)],
        )
        .await
    }

    pub async fn harvest_yield(&self, from: Address) -> Result<TxReceipt> {
        self.send(from, "harvestYield()", vec![]).await
    }

    /// Shares held by `who`.
    pub async fn balance_of(&self, who: Address) -> Result<u128> {
        self.read_uint("balanceOf(address)", vec![Token::Address(who)]).await
    }

    pub async fn convert_to_assets(&self, shares: u128) -> Result<u128> {
        self.read_uint("convertToAssets(uint256)", vec![Token::Uint(shares)]).await
    }

    pub async fn total_assets(&self) -> Result<u128> {
        self.read_uint("totalAssets()", vec![]).await
    }

    pub async fn total_supply(&self) -> Result<u128> {
        self.read_uint("totalSupply()", vec![]).await
    }
}

handle!(
    /// `UniversityRegistry`
    UniversityRegistry
);

/// On-chain registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUniversity {
    pub name: String,
    pub wallet: Address,
    pub locked: bool,
}

impl UniversityRegistry {
    pub async fn register_university(
        &self,
        from: Address,
        id: &str,
        name: &str,
        wallet: Address,
    ) -> Result<TxReceipt> {
        self.send(
            from,
            "registerUniversity(string,string,address)",
            vec![
                Token::String(id.to_string()),
                Token::String(name.to_string()),
                Token::Address(wallet),
            ],
        )
        .await
    }

    pub async fn lock_university_wallet(&self, from: Address, id: &str) -> Result<TxReceipt> {
        self.send(from, "lockUniversityWallet(string)", vec![Token::String(id.to_string())])
            .await
    }

    pub async fn is_university_registered(&self, id: &str) -> Result<bool> {
        self.read_bool("isUniversityRegistered(string)", vec![Token::String(id.to_string())])
            .await
    }

    pub async fn university(&self, id: &str) -> Result<Option<RegisteredUniversity>> {
        if !self.is_university_registered(id).await? {
            return Ok(None);
        }
        let mut tokens = self
            .read(
                "getUniversity(string)",
                vec![Token::String(id.to_string())],
                vec![ParamType::String, ParamType::Address, ParamType::Bool],
            )
            .await?
            .into_iter();
        let bad = || EndaomentError::Abi("unexpected return value from getUniversity".to_string());
        let name = tokens.next().and_then(Token::into_string).ok_or_else(bad)?;
        let wallet = tokens.next().and_then(Token::into_address).ok_or_else(bad)?;
        let locked = tokens.next().and_then(Token::into_bool).ok_or_else(bad)?;
        Ok(Some(RegisteredUniversity { name, wallet, locked }))
    }
}

handle!(
    /// `DonationTracker`
    DonationTracker
);

impl DonationTracker {
    pub async fn register_university(&self, from: Address, wallet: Address, name: &str) -> Result<TxReceipt> {
        self.send(
            from,
            "registerUniversity(address,string)",
            vec![Token::Address(wallet), Token::String(name.to_string())],
        )
        .await
    }

    /// Owner-only. The wallet must already be registered with the tracker.
    pub async fn record_donation(&self, from: Address, wallet: Address, amount: u128) -> Result<TxReceipt> {
        self.send(
            from,
            "recordDonation(address,uint256)",
            vec![Token::Address(wallet), Token::Uint(amount)],
        )
        .await
    }

    pub async fn record_yield(&self, from: Address, wallet: Address, amount: u128) -> Result<TxReceipt> {
        self.send(
            from,
            "recordYield(address,uint256)",
            vec![Token::Address(wallet), Token::Uint(amount)],
        )
        .await
    }

    pub async fn is_university_registered(&self, wallet: Address) -> Result<bool> {
        self.read_bool("isUniversityRegistered(address)", vec![Token::Address(wallet)])
            .await
    }

    pub async fn total_donations(&self, wallet: Address) -> Result<u128> {
        self.read_uint("getTotalDonations(address)", vec![Token::Address(wallet)])
            .await
    }

    pub async fn total_yield_distributed(&self, wallet: Address) -> Result<u128> {
        self.read_uint("getTotalYieldDistributed(address)", vec![Token::Address(wallet)])
            .await
    }
}

handle!(
    /// `StudentRegistry`
    StudentRegistry
);

impl StudentRegistry {
    pub async fn set_student_sbt(&self, from: Address, sbt: Address) -> Result<TxReceipt> {
        self.send(from, "setStudentSBT(address)", vec![Token::Address(sbt)]).await
    }

    pub async fn register_student(&self, from: Address, profile: &StudentProfile) -> Result<TxReceipt> {
        self.send(
            from,
            "registerStudent(string,string,string,string,uint256,uint256,uint256)",
            vec![
                Token::String(profile.name.clone()),
                Token::String(profile.university.clone()),
                Token::String(profile.research_area.clone()),
                Token::String(profile.student_id.clone()),
                Token::Uint(u128::from(profile.academic_achievements)),
                Token::Uint(u128::from(profile.sports_achievements)),
                Token::Uint(u128::from(profile.student_achievements)),
            ],
        )
        .await
    }

    pub async fn is_registered(&self, who: Address) -> Result<bool> {
        self.read_bool("isRegistered(address)", vec![Token::Address(who)]).await
    }

    /// Voting power in tenths of a vote.
    pub async fn voting_power_tenths(&self, who: Address) -> Result<u128> {
        self.read_uint("getVotingPower(address)", vec![Token::Address(who)]).await
    }
}
