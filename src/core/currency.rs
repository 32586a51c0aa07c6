//! Supported currencies and code validation

use crate::core::error::WalletError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurrencyDetails {
    Fiat {
        issuing_country: &'static str,
    },
    Crypto {
        algorithm: &'static str,
        market_cap: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Currency {
    pub code: &'static str,
    pub name: &'static str,
    pub details: CurrencyDetails,
}

impl Currency {
    pub fn kind(&self) -> CurrencyKind {
        match self.details {
            CurrencyDetails::Fiat { .. } => CurrencyKind::Fiat,
            CurrencyDetails::Crypto { .. } => CurrencyKind::Crypto,
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            CurrencyDetails::Fiat { issuing_country } => write!(
                f,
                "[FIAT] {} - {} (Issuing: {})",
                self.code, self.name, issuing_country
            ),
            CurrencyDetails::Crypto {
                algorithm,
                market_cap,
            } => write!(
                f,
                "[CRYPTO] {} - {} (Algo: {}, MCAP: {:.2e})",
                self.code, self.name, algorithm, market_cap
            ),
        }
    }
}

const fn fiat(code: &'static str, name: &'static str, issuing_country: &'static str) -> Currency {
    Currency {
        code,
        name,
        details: CurrencyDetails::Fiat { issuing_country },
    }
}

const fn crypto(
    code: &'static str,
    name: &'static str,
    algorithm: &'static str,
    market_cap: f64,
) -> Currency {
    Currency {
        code,
        name,
        details: CurrencyDetails::Crypto {
            algorithm,
            market_cap,
        },
    }
}

static REGISTRY: [Currency; 7] = [
    fiat("USD", "US Dollar", "United States"),
    fiat("EUR", "Euro", "Eurozone"),
    fiat("GBP", "British Pound", "United Kingdom"),
    fiat("RUB", "Russian Ruble", "Russia"),
    crypto("BTC", "Bitcoin", "SHA-256", 1.12e12),
    crypto("ETH", "Ethereum", "Ethash", 4.50e11),
    crypto("SOL", "Solana", "PoH", 7.00e10),
];

/// Normalizes a user supplied code to upper case and checks its shape.
pub fn normalize_code(code: &str) -> Result<String, WalletError> {
    let code = code.trim().to_uppercase();
    let valid = (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_uppercase());
    if valid {
        Ok(code)
    } else {
        Err(WalletError::InvalidCurrencyCode(code))
    }
}

pub fn get_currency(code: &str) -> Result<&'static Currency, WalletError> {
    let code = normalize_code(code)?;
    REGISTRY
        .iter()
        .find(|c| c.code == code)
        .ok_or(WalletError::CurrencyNotFound(code))
}

/// Category of a code, `None` when the registry does not know it.
pub fn kind_of(code: &str) -> Option<CurrencyKind> {
    REGISTRY.iter().find(|c| c.code == code).map(Currency::kind)
}

pub fn supported_codes() -> Vec<&'static str> {
    let mut codes: Vec<_> = REGISTRY.iter().map(|c| c.code).collect();
    codes.sort_unstable();
    codes
}
