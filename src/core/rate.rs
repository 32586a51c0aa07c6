//! Exchange rate abstractions and core types

use crate::core::currency::CurrencyKind;
use crate::core::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    CryptoProvider,
    FiatProvider,
}

impl RateSource {
    /// The source that is authoritative for a currency category.
    pub fn authoritative_for(kind: CurrencyKind) -> Self {
        match kind {
            CurrencyKind::Crypto => RateSource::CryptoProvider,
            CurrencyKind::Fiat => RateSource::FiatProvider,
        }
    }
}

impl Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RateSource::CryptoProvider => "crypto_provider",
                RateSource::FiatProvider => "fiat_provider",
            }
        )
    }
}

impl FromStr for RateSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crypto_provider" | "crypto" => Ok(RateSource::CryptoProvider),
            "fiat_provider" | "fiat" => Ok(RateSource::FiatProvider),
            _ => Err(anyhow::anyhow!("Invalid rate source: {}", s)),
        }
    }
}

/// Price of one unit of `currency_code` in the base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEntry {
    #[serde(skip)]
    pub currency_code: String,
    pub rate: f64,
    pub source: RateSource,
    /// When the provider published the rate.
    pub fetched_at: DateTime<Utc>,
    /// When a refresh cycle last obtained the rate from its provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl RateEntry {
    /// Builds an entry, or `None` when the rate is not a finite positive number.
    pub fn new(
        currency_code: &str,
        rate: f64,
        source: RateSource,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        Some(Self {
            currency_code: currency_code.to_string(),
            rate,
            source,
            fetched_at: fetched_at.trunc_subsecs(0),
            refreshed_at: None,
        })
    }

    pub fn refreshed(mut self, at: DateTime<Utc>) -> Self {
        self.refreshed_at = Some(at.trunc_subsecs(0));
        self
    }

    /// Time since this system last refreshed the entry. Entries never
    /// stamped by a cycle fall back to the provider timestamp.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.refreshed_at.unwrap_or(self.fetched_at)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl: StdDuration) -> bool {
        match Duration::from_std(ttl) {
            Ok(ttl) => self.age(now) > ttl,
            Err(_) => false,
        }
    }
}

/// Rates keyed by currency code.
///
/// Serialized as a plain JSON object `code -> {rate, source, fetched_at}`;
/// the code is restored into each entry on deserialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    entries: BTreeMap<String, RateEntry>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: RateEntry) -> Option<RateEntry> {
        self.entries.insert(entry.currency_code.clone(), entry)
    }

    pub fn get(&self, code: &str) -> Option<&RateEntry> {
        self.entries.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, RateEntry> {
        self.entries.values()
    }

    /// Most recent refresh across all entries.
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.entries
            .values()
            .map(|e| e.refreshed_at.unwrap_or(e.fetched_at))
            .max()
    }
}

impl FromIterator<RateEntry> for RateTable {
    fn from_iter<I: IntoIterator<Item = RateEntry>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for entry in iter {
            table.insert(entry);
        }
        table
    }
}

impl<'a> IntoIterator for &'a RateTable {
    type Item = &'a RateEntry;
    type IntoIter = btree_map::Values<'a, String, RateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

impl Serialize for RateTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RateTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, RateEntry>::deserialize(deserializer)?;
        let mut entries = BTreeMap::new();
        for (code, mut entry) in raw {
            if !entry.rate.is_finite() || entry.rate <= 0.0 {
                return Err(serde::de::Error::custom(format!(
                    "non-positive rate {} for {}",
                    entry.rate, code
                )));
            }
            entry.currency_code = code.clone();
            entries.insert(code, entry);
        }
        Ok(Self { entries })
    }
}

/// One committed table, as appended to the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateHistoryRecord {
    pub fetched_at: DateTime<Utc>,
    pub rates: RateTable,
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Display name used in logs and reports.
    fn name(&self) -> &str;

    /// The category of rates this provider is authoritative for.
    fn source(&self) -> RateSource;

    /// Performs a single request, bounded by `timeout`.
    async fn fetch(&self, timeout: StdDuration) -> Result<RateTable, ProviderError>;
}
