//! Core business logic abstractions

pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod portfolio;
pub mod rate;
pub mod user;

// Re-export main types for cleaner imports
pub use currency::{Currency, CurrencyKind};
pub use error::{ProviderError, RefreshError, StoreError, WalletError};
pub use rate::{RateEntry, RateHistoryRecord, RateProvider, RateSource, RateTable};
