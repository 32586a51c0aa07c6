use super::merge::{ProviderOutcome, merge};
use crate::core::config::AppConfig;
use crate::core::error::{ProviderError, RefreshError};
use crate::core::log::PARSER_TARGET;
use crate::core::rate::{RateProvider, RateSource, RateTable};
use crate::providers::util::with_retry;
use crate::providers::{ProviderSelection, build_providers};
use crate::store::RateStore;
use chrono::{DateTime, SubsecRound, Utc};
use futures::future::join_all;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Merging,
    Committing,
}

impl Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                RefreshState::Idle => "idle",
                RefreshState::Fetching => "fetching",
                RefreshState::Merging => "merging",
                RefreshState::Committing => "committing",
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpdaterOptions {
    pub timeout: Duration,
    pub retries: usize,
    pub retry_delay_ms: u64,
    /// Codes a cycle should produce; missing ones are reported as warnings.
    pub expected_codes: Vec<String>,
}

impl UpdaterOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        UpdaterOptions {
            timeout: config.parser.request_timeout(),
            retries: config.parser.retries,
            retry_delay_ms: config.parser.retry_delay_ms,
            expected_codes: config.expected_codes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub name: String,
    pub source: RateSource,
    /// Number of rates returned, or why the provider failed.
    pub result: Result<usize, ProviderError>,
}

#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub sources: Vec<SourceReport>,
    pub total: usize,
    pub fresh: usize,
    pub fallback: Vec<String>,
    pub warnings: Vec<String>,
    pub last_refresh: DateTime<Utc>,
}

impl RefreshReport {
    /// True when every requested provider answered.
    pub fn ok(&self) -> bool {
        self.sources.iter().all(|s| s.result.is_ok())
    }
}

/// Runs refresh cycles: fetch from all providers, merge with the cache, commit.
pub struct RatesUpdater {
    providers: Vec<Arc<dyn RateProvider>>,
    store: RateStore,
    options: UpdaterOptions,
    state: Mutex<RefreshState>,
}

impl RatesUpdater {
    pub fn new(
        providers: Vec<Arc<dyn RateProvider>>,
        store: RateStore,
        options: UpdaterOptions,
    ) -> Self {
        Self {
            providers,
            store,
            options,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    pub fn from_config(config: &AppConfig, selection: ProviderSelection, store: RateStore) -> Self {
        Self::new(
            build_providers(config, selection),
            store,
            UpdaterOptions::from_config(config),
        )
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &RateStore {
        &self.store
    }

    fn transition(&self, next: RefreshState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(target: PARSER_TARGET, "Refresh state {} -> {}", *state, next);
        *state = next;
    }

    /// Runs one refresh cycle and always returns to `Idle`.
    pub async fn run_update(&self) -> Result<RefreshReport, RefreshError> {
        info!(target: PARSER_TARGET, "Starting rates update...");
        let result = self.run_cycle().await;
        self.transition(RefreshState::Idle);
        match &result {
            Ok(report) if report.ok() => info!(target: PARSER_TARGET, "Update successful, {} rates", report.total),
            Ok(report) => warn!(target: PARSER_TARGET, "Update completed with errors, {} rates", report.total),
            Err(e) => error!(target: PARSER_TARGET, "Rates update failed: {}", e),
        }
        result
    }

    async fn run_cycle(&self) -> Result<RefreshReport, RefreshError> {
        self.transition(RefreshState::Fetching);
        let started_at = Utc::now().trunc_subsecs(0);
        let outcomes = self.fetch_all().await;

        let sources: Vec<SourceReport> = outcomes
            .iter()
            .map(|o| SourceReport {
                name: o.name.clone(),
                source: o.source,
                result: o.result.as_ref().map(RateTable::len).map_err(Clone::clone),
            })
            .collect();
        if sources.iter().all(|s| s.result.is_err()) {
            return Err(RefreshError::NoProviderSucceeded {
                errors: sources.into_iter().filter_map(|s| s.result.err()).collect(),
            });
        }

        self.transition(RefreshState::Merging);
        let previous = self.store.read_cache().unwrap_or_else(|e| {
            warn!(target: PARSER_TARGET, "Ignoring unreadable rate cache: {}", e);
            RateTable::new()
        });
        let merged = merge(&outcomes, &previous, &self.options.expected_codes, started_at)?;
        if merged.table.is_empty() {
            return Err(RefreshError::NothingToCommit);
        }

        self.transition(RefreshState::Committing);
        info!(target: PARSER_TARGET, "Writing {} rates to {}", merged.table.len(), self.store.cache_path().display());
        self.store.commit(&merged.table)?;

        Ok(RefreshReport {
            sources,
            total: merged.table.len(),
            fresh: merged.fresh.len(),
            fallback: merged.fallback,
            warnings: merged.warnings,
            last_refresh: started_at,
        })
    }

    /// Calls every provider concurrently and waits for all of them.
    async fn fetch_all(&self) -> Vec<ProviderOutcome> {
        let timeout = self.options.timeout;
        let futures = self.providers.iter().map(|provider| async move {
            info!(target: PARSER_TARGET, "Fetching from {}...", provider.name());
            let result = with_retry(
                move || fetch_bounded(provider.as_ref(), timeout),
                self.options.retries,
                self.options.retry_delay_ms,
            )
            .await;
            match &result {
                Ok(table) => info!(target: PARSER_TARGET, "{} OK ({} rates)", provider.name(), table.len()),
                Err(e) => error!(target: PARSER_TARGET, "Failed to fetch from {}: {}", provider.name(), e),
            }
            ProviderOutcome {
                name: provider.name().to_string(),
                source: provider.source(),
                result,
            }
        });
        join_all(futures).await
    }
}

/// A provider call that cannot outlive `timeout`, whatever the client does.
async fn fetch_bounded(
    provider: &dyn RateProvider,
    timeout: Duration,
) -> Result<RateTable, ProviderError> {
    match tokio::time::timeout(timeout, provider.fetch(timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateEntry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct MockProvider {
        name: &'static str,
        source: RateSource,
        rates: Option<Vec<(&'static str, f64)>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn ok(source: RateSource, rates: &[(&'static str, f64)]) -> Self {
            Self {
                name: match source {
                    RateSource::CryptoProvider => "crypto",
                    RateSource::FiatProvider => "fiat",
                },
                source,
                rates: Some(rates.to_vec()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(source: RateSource) -> Self {
            Self {
                rates: None,
                ..Self::ok(source, &[])
            }
        }
    }

    #[async_trait]
    impl RateProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn source(&self) -> RateSource {
            self.source
        }

        async fn fetch(&self, _timeout: Duration) -> Result<RateTable, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.rates {
                Some(rates) => Ok(rates
                    .iter()
                    .filter_map(|(code, rate)| RateEntry::new(code, *rate, self.source, Utc::now()))
                    .collect()),
                None => Err(ProviderError::Http {
                    provider: self.name.to_string(),
                    status: Some(503),
                    message: "server error".to_string(),
                }),
            }
        }
    }

    fn options() -> UpdaterOptions {
        UpdaterOptions {
            timeout: Duration::from_secs(1),
            retries: 0,
            retry_delay_ms: 1,
            expected_codes: vec![],
        }
    }

    fn updater(store: &RateStore, providers: Vec<Arc<dyn RateProvider>>) -> RatesUpdater {
        RatesUpdater::new(providers, store.clone(), options())
    }

    #[tokio::test]
    async fn test_successful_cycle_commits_merged_table() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let updater = updater(
            &store,
            vec![
                Arc::new(MockProvider::ok(RateSource::CryptoProvider, &[("BTC", 65000.0)])),
                Arc::new(MockProvider::ok(
                    RateSource::FiatProvider,
                    &[("USD", 1.0), ("EUR", 1.08)],
                )),
            ],
        );

        let report = updater.run_update().await.unwrap();
        assert!(report.ok());
        assert_eq!(report.total, 3);
        assert_eq!(report.fresh, 3);
        assert_eq!(updater.state(), RefreshState::Idle);
        assert_eq!(store.read_cache().unwrap().len(), 3);
        assert_eq!(store.read_history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_leaves_cache_untouched() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let seed: RateTable = [RateEntry::new("EUR", 1.08, RateSource::FiatProvider, Utc::now()).unwrap()]
            .into_iter()
            .collect();
        store.commit(&seed).unwrap();
        let before = std::fs::read(store.cache_path()).unwrap();

        let updater = updater(
            &store,
            vec![
                Arc::new(MockProvider::failing(RateSource::CryptoProvider)),
                Arc::new(MockProvider::failing(RateSource::FiatProvider)),
            ],
        );
        let result = updater.run_update().await;

        assert!(matches!(
            result,
            Err(RefreshError::NoProviderSucceeded { ref errors }) if errors.len() == 2
        ));
        assert_eq!(updater.state(), RefreshState::Idle);
        assert_eq!(std::fs::read(store.cache_path()).unwrap(), before);
        assert_eq!(store.read_history().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_error_and_falls_back() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let cached: RateTable = [RateEntry::new("ETH", 3000.0, RateSource::CryptoProvider, Utc::now()).unwrap()]
            .into_iter()
            .collect();
        store.commit(&cached).unwrap();

        let updater = updater(
            &store,
            vec![
                Arc::new(MockProvider::failing(RateSource::CryptoProvider)),
                Arc::new(MockProvider::ok(RateSource::FiatProvider, &[("USD", 1.0)])),
            ],
        );
        let report = updater.run_update().await.unwrap();

        assert!(!report.ok());
        assert_eq!(report.fallback, vec!["ETH"]);
        let cache = store.read_cache().unwrap();
        assert_eq!(cache.codes().collect::<Vec<_>>(), vec!["ETH", "USD"]);
        assert_eq!(cache.get("ETH"), cached.get("ETH"));
        assert_eq!(store.read_history().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rates_only_is_nothing_to_commit() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let updater = updater(
            &store,
            vec![Arc::new(MockProvider::ok(
                RateSource::FiatProvider,
                &[("EUR", -1.0)],
            ))],
        );
        let result = updater.run_update().await;
        assert!(matches!(result, Err(RefreshError::NothingToCommit)));
        assert!(!store.cache_path().exists());
        assert!(!store.history_path().exists());
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let slow = MockProvider {
            delay: Duration::from_secs(5),
            ..MockProvider::ok(RateSource::CryptoProvider, &[("BTC", 1.0)])
        };
        let mut opts = options();
        opts.timeout = Duration::from_millis(50);
        let updater = RatesUpdater::new(
            vec![
                Arc::new(slow),
                Arc::new(MockProvider::ok(RateSource::FiatProvider, &[("USD", 1.0)])),
            ],
            store.clone(),
            opts,
        );

        let report = updater.run_update().await.unwrap();
        let crypto = &report.sources[0];
        assert_eq!(
            crypto.result,
            Err(ProviderError::Timeout {
                provider: "crypto".to_string()
            })
        );
        assert_eq!(report.total, 1);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let dir = tempdir().unwrap();
        let store = RateStore::in_dir(dir.path());
        let failing = Arc::new(MockProvider::failing(RateSource::CryptoProvider));
        let mut opts = options();
        opts.retries = 2;
        let updater = RatesUpdater::new(
            vec![
                failing.clone(),
                Arc::new(MockProvider::ok(RateSource::FiatProvider, &[("USD", 1.0)])),
            ],
            store,
            opts,
        );

        updater.run_update().await.unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
    }
}
