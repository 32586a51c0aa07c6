pub mod cli;
pub mod core;
pub mod parser;
pub mod providers;
pub mod store;
pub mod wallet;

use crate::core::config::AppConfig;
use crate::providers::ProviderSelection;
use anyhow::Result;
use clap::Subcommand;
use tracing::{debug, info};

#[derive(Debug, Clone, Subcommand)]
pub enum AppCommand {
    /// Create a new user
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and remember the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the current session
    Logout,
    /// Show wallet balances and their value
    ShowPortfolio {
        /// Currency to value the portfolio in
        #[arg(long)]
        base: Option<String>,
    },
    /// Buy a currency with the USD wallet
    Buy {
        #[arg(long)]
        currency: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
    },
    /// Sell a currency into the USD wallet
    Sell {
        #[arg(long)]
        currency: String,
        #[arg(long, allow_negative_numbers = true)]
        amount: f64,
    },
    /// Show the exchange rate between two currencies
    GetRate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Fetch fresh rates and update the local cache
    UpdateRates {
        /// coingecko, exchangerate or all
        #[arg(long, default_value = "all")]
        source: ProviderSelection,
    },
    /// List rates from the local cache
    ShowRates {
        #[arg(long)]
        currency: Option<String>,
        /// Show only the N most expensive currencies
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        base: Option<String>,
    },
    /// Refresh rates periodically until Ctrl-C
    Schedule {
        /// Seconds between cycles, defaults to parser.interval_secs
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Interactive command loop
    Shell,
}

/// The config at `config_path`, or the default one.
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    match config_path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("valutatrade starting...");

    let config = load_config(config_path)?;
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Shell => cli::shell::run(&config).await,
        command => cli::execute(&config, command).await,
    }
}
