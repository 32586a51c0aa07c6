//! Error types shared by the rate service and the wallet.

use std::path::PathBuf;
use thiserror::Error;

/// A failed call to a single rate provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The request did not complete within the configured timeout.
    #[error("{provider}: request timed out")]
    Timeout { provider: String },

    /// Non-2xx status, connection failure or an error payload from the API.
    #[error("{provider}: HTTP error{}: {message}", fmt_status(.status))]
    Http {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// The response body could not be understood.
    #[error("{provider}: failed to parse response: {message}")]
    Parse { provider: String, message: String },

    /// The provider cannot be called with the current configuration.
    #[error("{provider}: not configured: {message}")]
    NotConfigured { provider: String, message: String },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Timeout { provider }
            | ProviderError::Http { provider, .. }
            | ProviderError::Parse { provider, .. }
            | ProviderError::NotConfigured { provider, .. } => provider,
        }
    }

    /// Whether a caller-side retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } => true,
            ProviderError::Http { status, .. } => {
                status.is_none_or(|s| s == 429 || (500..=599).contains(&s))
            }
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed data in {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("Refusing to commit an empty rate table")]
    EmptyTable,

    #[error("Failed to encode data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A refresh cycle that produced nothing to commit, or could not commit it.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("No rates fetched from any source: {}", summarize(.errors))]
    NoProviderSucceeded { errors: Vec<ProviderError> },

    #[error("Providers returned no usable rates and the cache is empty")]
    NothingToCommit,

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" {s}")).unwrap_or_default()
}

fn summarize(errors: &[ProviderError]) -> String {
    if errors.is_empty() {
        return "no provider selected".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Unknown currency '{0}'")]
    CurrencyNotFound(String),

    #[error("Invalid currency code '{0}': expected 2-5 upper-case letters")]
    InvalidCurrencyCode(String),

    #[error("Rate {from}→{to} is unavailable, run update-rates and try again")]
    RateUnavailable { from: String, to: String },

    #[error("Insufficient funds: available {available:.4} {code}, required {required:.4} {code}")]
    InsufficientFunds {
        available: f64,
        required: f64,
        code: String,
    },

    #[error("'{field}' must be a positive number")]
    InvalidAmount { field: String },

    #[error("Please log in first")]
    NotLoggedIn,

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Password must be at least {0} characters long")]
    PasswordTooShort(usize),

    #[error("'{0}' must not be empty")]
    EmptyField(String),

    #[error("You have no '{0}' wallet, it is created on the first purchase")]
    NoWallet(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
