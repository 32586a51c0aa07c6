//! Wallet balances held by a user.
use crate::core::currency::normalize_code;
use crate::core::error::WalletError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn ensure_positive(value: f64, field: &str) -> Result<f64, WalletError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(WalletError::InvalidAmount {
            field: field.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(skip)]
    pub currency_code: String,
    balance: f64,
}

impl Wallet {
    pub fn new(currency_code: &str) -> Self {
        Self {
            currency_code: currency_code.to_string(),
            balance: 0.0,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn deposit(&mut self, amount: f64) -> Result<(), WalletError> {
        self.balance += ensure_positive(amount, "amount")?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: f64) -> Result<(), WalletError> {
        let amount = ensure_positive(amount, "amount")?;
        if amount > self.balance {
            return Err(WalletError::InsufficientFunds {
                available: self.balance,
                required: amount,
                code: self.currency_code.clone(),
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: u64,
    #[serde(default)]
    wallets: BTreeMap<String, Wallet>,
}

impl Portfolio {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            wallets: BTreeMap::new(),
        }
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Returns the wallet for `code`, creating an empty one if needed.
    pub fn add_currency(&mut self, code: &str) -> Result<&mut Wallet, WalletError> {
        let code = normalize_code(code)?;
        Ok(self
            .wallets
            .entry(code.clone())
            .or_insert_with(|| Wallet::new(&code)))
    }

    pub fn get_wallet(&self, code: &str) -> Option<&Wallet> {
        self.wallets.get(code.trim().to_uppercase().as_str())
    }

    /// Restores wallet codes after deserialization, they are stored as map keys.
    pub(crate) fn restore_codes(mut self) -> Self {
        for (code, wallet) in self.wallets.iter_mut() {
            wallet.currency_code = code.clone();
        }
        self
    }

    /// Sums all balances converted with `rate(code) -> Option<price in base>`.
    /// Wallets without a rate are skipped and returned separately.
    pub fn total_value(&self, rate: impl Fn(&str) -> Option<f64>) -> (f64, Vec<String>) {
        let mut total = 0.0;
        let mut missing = Vec::new();
        for wallet in self.wallets.values() {
            match rate(&wallet.currency_code) {
                Some(r) => total += wallet.balance * r,
                None => missing.push(wallet.currency_code.clone()),
            }
        }
        (total, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposit_withdraw() {
        let mut wallet = Wallet::new("USD");
        wallet.deposit(100.0).unwrap();
        wallet.withdraw(40.0).unwrap();
        assert_eq!(wallet.balance(), 60.0);

        let err = wallet.withdraw(100.0).unwrap_err();
        assert!(matches!(
            err,
            WalletError::InsufficientFunds { available, required, ref code }
                if available == 60.0 && required == 100.0 && code == "USD"
        ));
        assert!(wallet.deposit(0.0).is_err());
        assert!(wallet.deposit(-5.0).is_err());
        assert!(wallet.withdraw(f64::NAN).is_err());
        assert_eq!(wallet.balance(), 60.0);
    }

    #[test]
    fn test_add_currency_is_idempotent() {
        let mut portfolio = Portfolio::new(1);
        portfolio.add_currency("btc").unwrap().deposit(0.5).unwrap();
        portfolio.add_currency("BTC").unwrap();
        assert_eq!(portfolio.wallets().count(), 1);
        assert_eq!(portfolio.get_wallet("Btc").unwrap().balance(), 0.5);
        assert!(portfolio.add_currency("b1").is_err());
    }

    #[test]
    fn test_total_value_reports_missing_rates() {
        let mut portfolio = Portfolio::new(1);
        portfolio.add_currency("USD").unwrap().deposit(100.0).unwrap();
        portfolio.add_currency("BTC").unwrap().deposit(0.01).unwrap();
        portfolio.add_currency("SOL").unwrap().deposit(1.0).unwrap();

        let (total, missing) = portfolio.total_value(|code| match code {
            "USD" => Some(1.0),
            "BTC" => Some(60000.0),
            _ => None,
        });
        assert!((total - 700.0).abs() < 1e-9);
        assert_eq!(missing, vec!["SOL".to_string()]);
    }

    #[test]
    fn test_json_restores_codes() {
        let json = r#"{"user_id": 3, "wallets": {"EUR": {"balance": 12.5}}}"#;
        let portfolio: Portfolio = serde_json::from_str::<Portfolio>(json)
            .unwrap()
            .restore_codes();
        assert_eq!(portfolio.get_wallet("EUR").unwrap().currency_code, "EUR");
    }
}
