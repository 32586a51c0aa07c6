pub mod account;
pub mod portfolio;
pub mod rates;
pub mod setup;
pub mod shell;
pub mod ui;

use crate::AppCommand;
use crate::core::config::AppConfig;
use crate::core::currency::supported_codes;
use crate::core::error::WalletError;
use crate::wallet::TradeSide;
use anyhow::Result;

/// Runs one command against an already loaded config.
pub async fn execute(config: &AppConfig, command: AppCommand) -> Result<()> {
    match command {
        AppCommand::Register { username, password } => {
            account::register(config, &username, &password)
        }
        AppCommand::Login { username, password } => account::login(config, &username, &password),
        AppCommand::Logout => account::logout(config),
        AppCommand::ShowPortfolio { base } => {
            portfolio::show_portfolio(config, base.as_deref()).await
        }
        AppCommand::Buy { currency, amount } => {
            portfolio::trade(config, TradeSide::Buy, &currency, amount).await
        }
        AppCommand::Sell { currency, amount } => {
            portfolio::trade(config, TradeSide::Sell, &currency, amount).await
        }
        AppCommand::GetRate { from, to } => rates::get_rate(config, &from, &to).await,
        AppCommand::UpdateRates { source } => rates::update_rates(config, source).await,
        AppCommand::ShowRates {
            currency,
            top,
            base,
        } => rates::show_rates(config, currency.as_deref(), top, base.as_deref()),
        AppCommand::Schedule { interval } => rates::schedule(config, interval).await,
        AppCommand::Shell => anyhow::bail!("Already in the shell"),
    }
}

/// Prints a hint for errors the user can act on and converts for `?`.
pub(crate) fn explain(err: WalletError) -> anyhow::Error {
    let hint = match &err {
        WalletError::CurrencyNotFound(_) | WalletError::InvalidCurrencyCode(_) => {
            Some(format!("Supported currencies: {}", supported_codes().join(", ")))
        }
        WalletError::RateUnavailable { .. } => {
            Some("Run update-rates or check the network and API key.".to_string())
        }
        WalletError::NotLoggedIn => Some("Use: login --username <name> --password <pass>".to_string()),
        _ => None,
    };
    if let Some(hint) = hint {
        eprintln!("{}", ui::style_text(&hint, ui::StyleType::Subtle));
    }
    err.into()
}
