//! Account and trading operations on top of the cached rates.

use crate::core::config::AppConfig;
use crate::core::currency::get_currency;
use crate::core::error::WalletError;
use crate::core::log::ACTIONS_TARGET;
use crate::core::portfolio::Portfolio;
use crate::core::rate::RateTable;
use crate::core::user::{Session, User};
use crate::parser::RatesUpdater;
use crate::providers::ProviderSelection;
use crate::store::{AccountStore, RateStore};
use anyhow::Result;
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Trades are always settled against this wallet.
pub const SETTLEMENT_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct WalletSettings {
    /// Currency the cached rates are quoted in.
    pub base_currency: String,
    pub rates_ttl: Duration,
    pub initial_usd_balance: f64,
}

impl WalletSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_currency: config.base_currency.clone(),
            rates_ttl: config.rates_ttl(),
            initial_usd_balance: config.initial_usd_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateQuote {
    pub from: String,
    pub to: String,
    pub rate: f64,
    /// Older timestamp of the two legs; `None` for identical codes or the base itself.
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioRow {
    pub code: String,
    pub balance: f64,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct PortfolioView {
    pub username: String,
    pub base: String,
    pub rows: Vec<PortfolioRow>,
    pub total: f64,
    /// Some value was computed from a rate older than the TTL.
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub code: String,
    pub before: f64,
    pub after: f64,
}

impl Display for BalanceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:.4}→{:.4}", self.code, self.before, self.after)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub side: TradeSide,
    pub code: String,
    pub amount: f64,
    /// Price of one unit in USD.
    pub rate: f64,
    /// Cost of a purchase or proceeds of a sale, in USD.
    pub usd_amount: f64,
    pub changes: Vec<BalanceChange>,
    pub stale: bool,
}

pub struct WalletService {
    accounts: AccountStore,
    rates: RateStore,
    updater: Option<RatesUpdater>,
    settings: WalletSettings,
}

impl WalletService {
    pub fn new(accounts: AccountStore, rates: RateStore, settings: WalletSettings) -> Self {
        Self {
            accounts,
            rates,
            updater: None,
            settings,
        }
    }

    /// Enables a refresh cycle when a needed rate is missing or stale.
    pub fn with_updater(mut self, updater: RatesUpdater) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let rates = RateStore::in_dir(&data_dir);
        let updater = RatesUpdater::from_config(config, ProviderSelection::All, rates.clone());
        Ok(Self::new(
            AccountStore::in_dir(&data_dir),
            rates,
            WalletSettings::from_config(config),
        )
        .with_updater(updater))
    }

    pub fn settings(&self) -> &WalletSettings {
        &self.settings
    }

    pub fn register(&self, username: &str, password: &str) -> Result<User, WalletError> {
        let user_id = self.accounts.next_user_id()?;
        let user = User::new(user_id, username, password, Utc::now().trunc_subsecs(0))?;
        if self.accounts.find_user(&user.username)?.is_some() {
            return Err(WalletError::UsernameTaken(user.username));
        }

        self.accounts.append_user(&user)?;
        self.accounts.upsert_portfolio(&Portfolio::new(user.user_id))?;
        info!("Registered user '{}' with id {}", user.username, user.user_id);
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session, WalletError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(WalletError::EmptyField("username".to_string()));
        }
        if password.is_empty() {
            return Err(WalletError::EmptyField("password".to_string()));
        }

        let user = self
            .accounts
            .find_user(username)?
            .ok_or_else(|| WalletError::UserNotFound(username.to_string()))?;
        if !user.verify_password(password) {
            return Err(WalletError::InvalidPassword);
        }

        let session = Session::from(&user);
        self.accounts.save_session(&session)?;
        self.seed_initial_balance(user.user_id)?;
        info!("User '{}' logged in", session.username);
        Ok(session)
    }

    pub fn logout(&self) -> Result<(), WalletError> {
        self.accounts.clear_session()?;
        Ok(())
    }

    /// The persisted session, or `NotLoggedIn`.
    pub fn current_session(&self) -> Result<Session, WalletError> {
        self.accounts.load_session()?.ok_or(WalletError::NotLoggedIn)
    }

    fn seed_initial_balance(&self, user_id: u64) -> Result<(), WalletError> {
        let initial = self.settings.initial_usd_balance;
        let mut portfolio = self.load_portfolio(user_id)?;
        if portfolio.get_wallet(SETTLEMENT_CURRENCY).is_some() || initial <= 0.0 {
            return Ok(());
        }
        portfolio.add_currency(SETTLEMENT_CURRENCY)?.deposit(initial)?;
        debug!("Seeded {} with {:.2} {}", user_id, initial, SETTLEMENT_CURRENCY);
        Ok(self.accounts.upsert_portfolio(&portfolio)?)
    }

    fn load_portfolio(&self, user_id: u64) -> Result<Portfolio, WalletError> {
        Ok(self
            .accounts
            .get_portfolio(user_id)?
            .unwrap_or_else(|| Portfolio::new(user_id)))
    }

    pub async fn show_portfolio(
        &self,
        session: &Session,
        base: Option<&str>,
    ) -> Result<PortfolioView, WalletError> {
        let base = get_currency(base.unwrap_or(&self.settings.base_currency))?.code;
        let portfolio = self.load_portfolio(session.user_id)?;

        let mut view = PortfolioView {
            username: session.username.clone(),
            base: base.to_string(),
            rows: Vec::new(),
            total: 0.0,
            stale: false,
        };
        if portfolio.is_empty() {
            return Ok(view);
        }

        let mut codes: Vec<&str> = portfolio.wallets().map(|w| w.currency_code.as_str()).collect();
        codes.push(base);
        let table = self.load_rates(&codes).await;

        let now = Utc::now();
        let mut prices = HashMap::new();
        for wallet in portfolio.wallets() {
            let Some(quote) = self.quote(&table, &wallet.currency_code, base, now) else {
                continue;
            };
            view.stale |= quote.stale;
            view.rows.push(PortfolioRow {
                code: wallet.currency_code.clone(),
                balance: wallet.balance(),
                value: wallet.balance() * quote.rate,
            });
            prices.insert(wallet.currency_code.clone(), quote.rate);
        }

        // A partial total would understate the portfolio
        let (total, missing) = portfolio.total_value(|code| prices.get(code).copied());
        if let Some(code) = missing.into_iter().next() {
            return Err(WalletError::RateUnavailable {
                from: code,
                to: base.to_string(),
            });
        }
        view.total = total;
        Ok(view)
    }

    pub async fn get_rate(&self, from: &str, to: &str) -> Result<RateQuote, WalletError> {
        let from = get_currency(from)?.code;
        let to = get_currency(to)?.code;
        let table = self.load_rates(&[from, to]).await;
        self.quote(&table, from, to, Utc::now())
            .ok_or_else(|| WalletError::RateUnavailable {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    pub async fn buy(
        &self,
        session: &Session,
        code: &str,
        amount: f64,
    ) -> Result<TradeReceipt, WalletError> {
        let result = self.trade(session, TradeSide::Buy, code, amount).await;
        log_action(session, TradeSide::Buy, code, amount, &result);
        result
    }

    pub async fn sell(
        &self,
        session: &Session,
        code: &str,
        amount: f64,
    ) -> Result<TradeReceipt, WalletError> {
        let result = self.trade(session, TradeSide::Sell, code, amount).await;
        log_action(session, TradeSide::Sell, code, amount, &result);
        result
    }

    async fn trade(
        &self,
        session: &Session,
        side: TradeSide,
        code: &str,
        amount: f64,
    ) -> Result<TradeReceipt, WalletError> {
        let code = get_currency(code)?.code;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(WalletError::InvalidAmount {
                field: "amount".to_string(),
            });
        }

        let mut portfolio = self.load_portfolio(session.user_id)?;
        if side == TradeSide::Sell && portfolio.get_wallet(code).is_none() {
            return Err(WalletError::NoWallet(code.to_string()));
        }

        let (rate, stale) = if code == SETTLEMENT_CURRENCY {
            (1.0, false)
        } else {
            let table = self.load_rates(&[code, SETTLEMENT_CURRENCY]).await;
            let quote = self
                .quote(&table, code, SETTLEMENT_CURRENCY, Utc::now())
                .ok_or_else(|| WalletError::RateUnavailable {
                    from: code.to_string(),
                    to: SETTLEMENT_CURRENCY.to_string(),
                })?;
            if quote.stale {
                warn!("Using a stale {}→{} rate", code, SETTLEMENT_CURRENCY);
            }
            (quote.rate, quote.stale)
        };
        let usd_amount = amount * rate;

        // Debit first so a failed withdrawal leaves nothing half-applied
        let (debit_code, debit, credit_code, credit) = match side {
            TradeSide::Buy => (SETTLEMENT_CURRENCY, usd_amount, code, amount),
            TradeSide::Sell => (code, amount, SETTLEMENT_CURRENCY, usd_amount),
        };
        let mut changes = Vec::with_capacity(2);
        if code == SETTLEMENT_CURRENCY {
            let wallet = portfolio.add_currency(code)?;
            let before = wallet.balance();
            match side {
                TradeSide::Buy => wallet.deposit(amount)?,
                TradeSide::Sell => wallet.withdraw(amount)?,
            }
            changes.push(BalanceChange {
                code: code.to_string(),
                before,
                after: wallet.balance(),
            });
        } else {
            let wallet = portfolio.add_currency(debit_code)?;
            let before = wallet.balance();
            wallet.withdraw(debit)?;
            changes.push(BalanceChange {
                code: debit_code.to_string(),
                before,
                after: wallet.balance(),
            });

            let wallet = portfolio.add_currency(credit_code)?;
            let before = wallet.balance();
            wallet.deposit(credit)?;
            changes.push(BalanceChange {
                code: credit_code.to_string(),
                before,
                after: wallet.balance(),
            });
        }

        self.accounts.upsert_portfolio(&portfolio)?;
        Ok(TradeReceipt {
            side,
            code: code.to_string(),
            amount,
            rate,
            usd_amount,
            changes,
            stale,
        })
    }

    /// Reads the cache, running one refresh first when any of `codes`
    /// lacks a rate or has a stale one. A failed refresh keeps what was read.
    async fn load_rates(&self, codes: &[&str]) -> RateTable {
        let table = self.read_rates();
        let Some(updater) = &self.updater else {
            return table;
        };

        let now = Utc::now();
        let outdated: Vec<&str> = codes
            .iter()
            .copied()
            .filter(|code| *code != self.settings.base_currency)
            .filter(|code| {
                table
                    .get(code)
                    .is_none_or(|e| e.is_stale(now, self.settings.rates_ttl))
            })
            .collect();
        if outdated.is_empty() {
            return table;
        }

        info!("Rates for {} are missing or stale, refreshing", outdated.join(", "));
        match updater.run_update().await {
            Ok(_) => self.read_rates(),
            Err(e) => {
                warn!("Refresh failed, using cached rates: {}", e);
                table
            }
        }
    }

    fn read_rates(&self) -> RateTable {
        self.rates.read_cache().unwrap_or_else(|e| {
            warn!("Ignoring unreadable rate cache: {}", e);
            RateTable::new()
        })
    }

    /// Cross rate through the base currency: `price(from) / price(to)`.
    fn quote(&self, table: &RateTable, from: &str, to: &str, now: DateTime<Utc>) -> Option<RateQuote> {
        let base = self.settings.base_currency.as_str();
        let mut quote = RateQuote {
            from: from.to_string(),
            to: to.to_string(),
            rate: 1.0,
            fetched_at: None,
            stale: false,
        };
        if from == to {
            return Some(quote);
        }

        let mut price = |code: &str| -> Option<f64> {
            if code == base {
                return Some(1.0);
            }
            let entry = table.get(code)?;
            quote.fetched_at = Some(match quote.fetched_at {
                Some(at) => at.min(entry.fetched_at),
                None => entry.fetched_at,
            });
            quote.stale |= entry.is_stale(now, self.settings.rates_ttl);
            Some(entry.rate)
        };
        let from_price = price(from)?;
        let to_price = price(to)?;
        quote.rate = from_price / to_price;
        Some(quote)
    }
}

fn log_action(
    session: &Session,
    side: TradeSide,
    code: &str,
    amount: f64,
    result: &Result<TradeReceipt, WalletError>,
) {
    match result {
        Ok(receipt) => info!(
            target: ACTIONS_TARGET,
            action = %side,
            user = %session.username,
            currency = %receipt.code,
            amount,
            rate = receipt.rate,
            result = "OK",
            "{}",
            receipt
                .changes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        ),
        Err(e) => warn!(
            target: ACTIONS_TARGET,
            action = %side,
            user = %session.username,
            currency = %code.trim().to_uppercase(),
            amount,
            result = "ERROR",
            error = %e,
            "Trade rejected"
        ),
    }
}
