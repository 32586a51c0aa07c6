use crate::core::config::CoinGeckoConfig;
use crate::core::error::ProviderError;
use crate::core::rate::{RateEntry, RateProvider, RateSource, RateTable};
use crate::providers::util::{get_json, http_client};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const NAME: &str = "CoinGecko";

/// Crypto prices from the CoinGecko "simple price" endpoint.
pub struct CoinGeckoProvider {
    base_url: String,
    /// Currency code to coin id.
    ids: BTreeMap<String, String>,
    base_currency: String,
}

impl CoinGeckoProvider {
    pub fn new(config: &CoinGeckoConfig, base_currency: &str) -> Self {
        CoinGeckoProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ids: config
                .ids
                .iter()
                .map(|(code, id)| (code.trim().to_uppercase(), id.trim().to_string()))
                .collect(),
            base_currency: base_currency.to_lowercase(),
        }
    }

    fn url(&self) -> Result<reqwest::Url, ProviderError> {
        let ids = self.ids.values().cloned().collect::<Vec<_>>().join(",");
        reqwest::Url::parse_with_params(
            &format!("{}/simple/price", self.base_url),
            &[("ids", ids.as_str()), ("vs_currencies", self.base_currency.as_str())],
        )
        .map_err(|e| ProviderError::NotConfigured {
            provider: NAME.to_string(),
            message: format!("invalid base url '{}': {}", self.base_url, e),
        })
    }

    /// Extracts one entry per configured coin, dropping unusable values.
    fn parse(&self, body: &Value) -> Result<RateTable, ProviderError> {
        let coins = body.as_object().ok_or_else(|| ProviderError::Parse {
            provider: NAME.to_string(),
            message: "expected a JSON object".to_string(),
        })?;

        let fetched_at = Utc::now();
        let mut table = RateTable::new();
        for (code, id) in &self.ids {
            let Some(raw) = coins.get(id).and_then(|c| c.get(&self.base_currency)) else {
                debug!("{} returned no price for {} ({})", NAME, code, id);
                continue;
            };
            match raw
                .as_f64()
                .and_then(|rate| RateEntry::new(code, rate, RateSource::CryptoProvider, fetched_at))
            {
                Some(entry) => {
                    table.insert(entry);
                }
                None => warn!("{}: dropping invalid rate {} for {}", NAME, raw, code),
            }
        }
        Ok(table)
    }
}

#[async_trait]
impl RateProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn source(&self) -> RateSource {
        RateSource::CryptoProvider
    }

    #[instrument(name = "CoinGeckoFetch", skip(self), fields(coins = self.ids.len()))]
    async fn fetch(&self, timeout: Duration) -> Result<RateTable, ProviderError> {
        let client = http_client(NAME, timeout)?;
        let body: Value = get_json(NAME, &client, self.url()?).await?;
        let table = self.parse(&body)?;
        debug!("{} returned {} rates", NAME, table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(template: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "bitcoin,ethereum,solana"))
            .and(query_param("vs_currencies", "usd"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(base_url: &str) -> CoinGeckoProvider {
        let config = CoinGeckoConfig {
            base_url: base_url.to_string(),
            ..CoinGeckoConfig::default()
        };
        CoinGeckoProvider::new(&config, "USD")
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let mock_response = r#"{
            "bitcoin": {"usd": 65000},
            "ethereum": {"usd": 3720.5},
            "solana": {"usd": 145.12}
        }"#;
        let server =
            create_mock_server(ResponseTemplate::new(200).set_body_string(mock_response)).await;

        let table = provider(&server.uri())
            .fetch(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(table.len(), 3);
        let btc = table.get("BTC").unwrap();
        assert_eq!(btc.rate, 65000.0);
        assert_eq!(btc.source, RateSource::CryptoProvider);
        assert_eq!(table.get("ETH").unwrap().rate, 3720.5);
    }

    #[tokio::test]
    async fn test_invalid_entries_are_dropped_individually() {
        let mock_response = r#"{
            "bitcoin": {"usd": -1},
            "ethereum": {"usd": "n/a"},
            "solana": {"usd": 145.12}
        }"#;
        let server =
            create_mock_server(ResponseTemplate::new(200).set_body_string(mock_response)).await;

        let table = provider(&server.uri())
            .fetch(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(table.codes().collect::<Vec<_>>(), vec!["SOL"]);
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = create_mock_server(ResponseTemplate::new(429)).await;
        let result = provider(&server.uri()).fetch(Duration::from_secs(5)).await;
        assert_eq!(
            result.unwrap_err(),
            ProviderError::Http {
                provider: "CoinGecko".to_string(),
                status: Some(429),
                message: "too many requests".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server =
            create_mock_server(ResponseTemplate::new(200).set_body_string("[1, 2, 3]")).await;
        let result = provider(&server.uri()).fetch(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ProviderError::Parse { .. })));

        let server =
            create_mock_server(ResponseTemplate::new(200).set_body_string("<html>")).await;
        let result = provider(&server.uri()).fetch(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ProviderError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = create_mock_server(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_millis(500)),
        )
        .await;
        let result = provider(&server.uri())
            .fetch(Duration::from_millis(50))
            .await;
        assert_eq!(
            result.unwrap_err(),
            ProviderError::Timeout {
                provider: "CoinGecko".to_string()
            }
        );
    }
}
