//! The rate refresh service: fetch, merge, commit.

pub mod merge;
pub mod scheduler;
pub mod updater;

pub use merge::{MergeOutcome, ProviderOutcome, merge};
pub use scheduler::run_periodic;
pub use updater::{RatesUpdater, RefreshReport, RefreshState, SourceReport, UpdaterOptions};
