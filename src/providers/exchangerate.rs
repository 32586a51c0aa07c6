use crate::core::config::ExchangeRateConfig;
use crate::core::error::ProviderError;
use crate::core::rate::{RateEntry, RateProvider, RateSource, RateTable};
use crate::providers::util::{get_json, http_client};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const NAME: &str = "ExchangeRate-API";

/// Fiat rates from the ExchangeRate-API "latest" endpoint.
pub struct ExchangeRateProvider {
    base_url: String,
    api_key: Option<String>,
    currencies: Vec<String>,
    base_currency: String,
}

impl ExchangeRateProvider {
    pub fn new(config: &ExchangeRateConfig, base_currency: &str) -> Self {
        ExchangeRateProvider {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            currencies: config
                .currencies
                .iter()
                .map(|c| c.trim().to_uppercase())
                .collect(),
            base_currency: base_currency.to_uppercase(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Value>,
    time_last_update_utc: Option<String>,
}

/// The API quotes units of each currency per one base unit; the table holds
/// the price of one unit in the base currency, hence the inversion.
fn to_table(
    response: &LatestResponse,
    currencies: &[String],
    now: DateTime<Utc>,
) -> RateTable {
    let fetched_at = response
        .time_last_update_utc
        .as_deref()
        .and_then(|s| match DateTime::parse_from_rfc2822(s) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                debug!("Unparseable time_last_update_utc '{}': {}", s, e);
                None
            }
        })
        .unwrap_or(now);

    let mut table = RateTable::new();
    for code in currencies {
        let Some(raw) = response.rates.get(code) else {
            debug!("{} returned no rate for {}", NAME, code);
            continue;
        };
        let entry = raw
            .as_f64()
            .filter(|units| *units > 0.0)
            .and_then(|units| RateEntry::new(code, 1.0 / units, RateSource::FiatProvider, fetched_at));
        match entry {
            Some(entry) => {
                table.insert(entry);
            }
            None => warn!("{}: dropping invalid rate {} for {}", NAME, raw, code),
        }
    }
    table
}

#[async_trait]
impl RateProvider for ExchangeRateProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn source(&self) -> RateSource {
        RateSource::FiatProvider
    }

    #[instrument(name = "ExchangeRateFetch", skip(self), fields(base = %self.base_currency))]
    async fn fetch(&self, timeout: Duration) -> Result<RateTable, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: NAME.to_string(),
                message: format!(
                    "API key is missing (set providers.exchangerate.api_key or {})",
                    crate::core::config::API_KEY_ENV
                ),
            })?;

        let url = reqwest::Url::parse(&format!(
            "{}/{}/latest/{}",
            self.base_url, api_key, self.base_currency
        ))
        .map_err(|e| ProviderError::NotConfigured {
            provider: NAME.to_string(),
            message: format!("invalid base url '{}': {}", self.base_url, e),
        })?;

        let client = http_client(NAME, timeout)?;
        let response: LatestResponse = get_json(NAME, &client, url).await?;
        if response.result != "success" {
            return Err(ProviderError::Http {
                provider: NAME.to_string(),
                status: None,
                message: format!(
                    "API error: {}",
                    response.error_type.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let table = to_table(&response, &self.currencies, Utc::now());
        debug!("{} returned {} rates", NAME, table.len());
        Ok(table)
    }
}
