//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EndaomentError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Node or transport failure, message kept verbatim.
    #[error("{0}")]
    Rpc(String),

    /// Contract revert, message kept verbatim.
    #[error("{0}")]
    Reverted(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("No deployment of {name} recorded on network {network}")]
    MissingDeployment { network: String, name: String },

    #[error("Task graph error: {0}")]
    TaskGraph(String),

    #[error("Invalid transaction flow transition: {0}")]
    InvalidTransition(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Scenario check failed: {0}")]
    Scenario(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Off-chain validation failures. Messages are shown to users as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please connect your wallet")]
    WalletNotConnected,

    #[error("Please select a university")]
    UniversityNotSelected,

    #[error("This university is already registered")]
    UniversityAlreadyRegistered,

    #[error("Unknown university: {0}")]
    UnknownUniversity(String),

    #[error("Please fill all required fields")]
    MissingFields,

    #[error("Amount must be greater than 0")]
    NonPositiveAmount,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Minimum donation is $10 USDC")]
    BelowMinimum,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Achievement count must be between 0 and {max}")]
    AchievementOutOfRange { max: u32 },
}

pub type Result<T> = std::result::Result<T, EndaomentError>;
