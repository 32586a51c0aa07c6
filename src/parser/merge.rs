//! Combines provider results and the previous cache into one rate table.

use crate::core::currency::kind_of;
use crate::core::error::{ProviderError, RefreshError};
use crate::core::rate::{RateSource, RateTable};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Result of calling one provider during a refresh cycle.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub name: String,
    pub source: RateSource,
    pub result: Result<RateTable, ProviderError>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub table: RateTable,
    /// Codes taken from a fresh provider response.
    pub fresh: Vec<String>,
    /// Codes carried over unchanged from the previous cache.
    pub fallback: Vec<String>,
    /// Codes that had neither and were left out.
    pub warnings: Vec<String>,
}

/// Builds the table to commit for this cycle.
///
/// Every code is taken from the provider authoritative for its category.
/// When that provider failed, was not called, or did not return the code,
/// the previously cached entry is reused with its original `fetched_at` and
/// `refreshed_at`. Fresh entries are stamped with `refreshed_at`. Codes with
/// neither are omitted with a warning. Fails only when no provider succeeded
/// at all.
pub fn merge(
    outcomes: &[ProviderOutcome],
    previous: &RateTable,
    expected: &[String],
    refreshed_at: DateTime<Utc>,
) -> Result<MergeOutcome, RefreshError> {
    let fresh: HashMap<RateSource, &RateTable> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|t| (o.source, t)))
        .collect();

    if fresh.is_empty() {
        return Err(RefreshError::NoProviderSucceeded {
            errors: outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().err().cloned())
                .collect(),
        });
    }

    let codes: BTreeSet<&str> = fresh
        .values()
        .flat_map(|t| t.codes())
        .chain(previous.codes())
        .chain(expected.iter().map(String::as_str))
        .collect();

    let mut merged = MergeOutcome::default();
    for code in codes {
        let Some(authority) = authority_for(code, outcomes, previous) else {
            warn!("No rate available for {}, omitting it", code);
            merged.warnings.push(format!("No rate available for {code}"));
            continue;
        };

        if let Some(entry) = fresh.get(&authority).and_then(|t| t.get(code)) {
            merged.table.insert(entry.clone().refreshed(refreshed_at));
            merged.fresh.push(code.to_string());
        } else if let Some(entry) = previous.get(code) {
            debug!("Keeping cached rate for {} from {}", code, entry.fetched_at);
            merged.table.insert(entry.clone());
            merged.fallback.push(code.to_string());
        } else {
            warn!(
                "No rate available for {} from {} or the cache, omitting it",
                code, authority
            );
            merged.warnings.push(format!("No rate available for {code}"));
        }
    }
    Ok(merged)
}

/// The registry category decides; codes it does not know belong to whichever
/// provider reported them, or to the source recorded in the cache.
fn authority_for(
    code: &str,
    outcomes: &[ProviderOutcome],
    previous: &RateTable,
) -> Option<RateSource> {
    kind_of(code)
        .map(RateSource::authoritative_for)
        .or_else(|| {
            outcomes
                .iter()
                .find(|o| o.result.as_ref().is_ok_and(|t| t.contains(code)))
                .map(|o| o.source)
        })
        .or_else(|| previous.get(code).map(|e| e.source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateEntry;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn table(source: RateSource, fetched_at: DateTime<Utc>, rates: &[(&str, f64)]) -> RateTable {
        rates
            .iter()
            .map(|(code, rate)| RateEntry::new(code, *rate, source, fetched_at).unwrap())
            .collect()
    }

    fn ok(source: RateSource, table: RateTable) -> ProviderOutcome {
        ProviderOutcome {
            name: format!("{source}"),
            source,
            result: Ok(table),
        }
    }

    fn failed(source: RateSource) -> ProviderOutcome {
        ProviderOutcome {
            name: format!("{source}"),
            source,
            result: Err(ProviderError::Timeout {
                provider: format!("{source}"),
            }),
        }
    }

    #[test]
    fn test_fresh_and_cached_scenario() {
        let crypto = table(RateSource::CryptoProvider, at(100), &[("BTC", 65000.0)]);
        let fiat = table(
            RateSource::FiatProvider,
            at(100),
            &[("USD", 1.0), ("EUR", 0.92)],
        );
        let previous = table(
            RateSource::FiatProvider,
            at(10),
            &[("EUR", 0.91), ("JPY", 150.0)],
        );

        let merged = merge(
            &[
                ok(RateSource::CryptoProvider, crypto),
                ok(RateSource::FiatProvider, fiat),
            ],
            &previous,
            &[],
            at(120),
        )
        .unwrap();

        let t = &merged.table;
        assert_eq!(t.codes().collect::<Vec<_>>(), vec!["BTC", "EUR", "JPY", "USD"]);
        assert_eq!(t.get("BTC").unwrap().rate, 65000.0);
        assert_eq!(t.get("USD").unwrap().rate, 1.0);
        // Fresh value wins over the cached one
        assert_eq!(t.get("EUR").unwrap().rate, 0.92);
        assert_eq!(t.get("EUR").unwrap().fetched_at, at(100));
        assert_eq!(t.get("EUR").unwrap().refreshed_at, Some(at(120)));
        // Fallback keeps the original timestamp
        assert_eq!(t.get("JPY").unwrap().rate, 150.0);
        assert_eq!(t.get("JPY").unwrap().fetched_at, at(10));
        assert_eq!(t.get("JPY").unwrap().refreshed_at, None);
        assert_eq!(merged.fallback, vec!["JPY"]);
        assert!(merged.warnings.is_empty());
    }

    #[test]
    fn test_partial_failure_uses_cache_only_for_failed_side() {
        let fiat = table(
            RateSource::FiatProvider,
            at(100),
            &[("USD", 1.0), ("EUR", 1.08)],
        );
        let previous = table(RateSource::CryptoProvider, at(5), &[("ETH", 3000.0)]);
        let expected: Vec<String> = ["BTC", "ETH", "EUR", "USD"]
            .into_iter()
            .map(String::from)
            .collect();

        let merged = merge(
            &[
                failed(RateSource::CryptoProvider),
                ok(RateSource::FiatProvider, fiat),
            ],
            &previous,
            &expected,
            at(120),
        )
        .unwrap();

        let t = &merged.table;
        assert_eq!(t.codes().collect::<Vec<_>>(), vec!["ETH", "EUR", "USD"]);
        assert_eq!(t.get("ETH").unwrap().fetched_at, at(5));
        // BTC has no fresh value and no cached one
        assert_eq!(merged.warnings, vec!["No rate available for BTC"]);
        assert_eq!(merged.fresh, vec!["EUR", "USD"]);
    }

    #[test]
    fn test_total_failure() {
        let previous = table(RateSource::FiatProvider, at(5), &[("EUR", 1.08)]);
        let result = merge(
            &[
                failed(RateSource::CryptoProvider),
                failed(RateSource::FiatProvider),
            ],
            &previous,
            &[],
            at(120),
        );
        match result {
            Err(RefreshError::NoProviderSucceeded { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("Expected NoProviderSucceeded, got {other:?}"),
        }
    }

    #[test]
    fn test_non_authoritative_entries_are_ignored() {
        // The fiat provider also reports BTC, the crypto provider is down
        let fiat = table(
            RateSource::FiatProvider,
            at(100),
            &[("USD", 1.0), ("BTC", 1.0)],
        );
        let merged = merge(
            &[
                failed(RateSource::CryptoProvider),
                ok(RateSource::FiatProvider, fiat),
            ],
            &RateTable::new(),
            &[],
            at(120),
        )
        .unwrap();
        assert_eq!(merged.table.codes().collect::<Vec<_>>(), vec!["USD"]);
        assert_eq!(merged.warnings, vec!["No rate available for BTC"]);
    }

    #[test]
    fn test_unknown_codes_follow_reporting_provider() {
        let fiat = table(RateSource::FiatProvider, at(100), &[("JPY", 0.0067)]);
        let merged = merge(
            &[ok(RateSource::FiatProvider, fiat)],
            &RateTable::new(),
            &["CHF".to_string()],
            at(120),
        )
        .unwrap();
        assert_eq!(merged.table.codes().collect::<Vec<_>>(), vec!["JPY"]);
        assert_eq!(merged.warnings, vec!["No rate available for CHF"]);
    }
}
