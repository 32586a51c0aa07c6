use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Currency code to CoinGecko coin id.
    pub ids: BTreeMap<String, String>,
}

fn default_coin_ids() -> BTreeMap<String, String> {
    [("BTC", "bitcoin"), ("ETH", "ethereum"), ("SOL", "solana")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        CoinGeckoConfig {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            ids: default_coin_ids(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ExchangeRateConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub currencies: Vec<String>,
}

fn default_fiat_currencies() -> Vec<String> {
    ["USD", "EUR", "GBP", "RUB"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        ExchangeRateConfig {
            base_url: "https://v6.exchangerate-api.com/v6".to_string(),
            api_key: None,
            currencies: default_fiat_currencies(),
        }
    }
}

impl ExchangeRateConfig {
    /// Key from the config file, falling back to the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub coingecko: CoinGeckoConfig,
    #[serde(default)]
    pub exchangerate: ExchangeRateConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ParserConfig {
    pub request_timeout_secs: u64,
    pub retries: usize,
    pub retry_delay_ms: u64,
    pub interval_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            request_timeout_secs: 10,
            retries: 0,
            retry_delay_ms: 500,
            interval_secs: 300,
        }
    }
}

impl ParserConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data_path: Option<String>,
    /// Directory of the persistent action and parser logs.
    pub logs_dir: Option<String>,
    pub base_currency: String,
    pub rates_ttl_seconds: u64,
    pub initial_usd_balance: f64,
    pub providers: ProvidersConfig,
    pub parser: ParserConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_path: None,
            logs_dir: None,
            base_currency: "USD".to_string(),
            rates_ttl_seconds: 300,
            initial_usd_balance: 1000.0,
            providers: ProvidersConfig::default(),
            parser: ParserConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or defaults if there is none.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "valutatrade", "valutatrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "valutatrade", "valutatrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// `logs_dir` when set, otherwise `logs/` under the data directory.
    pub fn logs_dir(&self) -> Result<PathBuf> {
        match &self.logs_dir {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Ok(self.data_dir()?.join("logs")),
        }
    }

    pub fn rates_ttl(&self) -> Duration {
        Duration::from_secs(self.rates_ttl_seconds)
    }

    /// Every code a refresh cycle is expected to produce.
    pub fn expected_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .providers
            .coingecko
            .ids
            .keys()
            .chain(self.providers.exchangerate.currencies.iter())
            .map(|c| c.trim().to_uppercase())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.base_currency = config.base_currency.trim().to_uppercase();
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
data_path: "/tmp/valutatrade"
logs_dir: "/var/log/valutatrade"
base_currency: "usd"
rates_ttl_seconds: 60
initial_usd_balance: 250.0
providers:
  coingecko:
    base_url: "http://example.com/coingecko"
    ids:
      BTC: bitcoin
  exchangerate:
    base_url: "http://example.com/exchangerate"
    api_key: "secret"
    currencies: ["USD", "EUR"]
parser:
  request_timeout_secs: 3
  retries: 2
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.data_path.as_deref(), Some("/tmp/valutatrade"));
        assert_eq!(
            config.logs_dir().unwrap(),
            PathBuf::from("/var/log/valutatrade")
        );
        assert_eq!(config.rates_ttl_seconds, 60);
        assert_eq!(config.initial_usd_balance, 250.0);
        assert_eq!(
            config.providers.coingecko.base_url,
            "http://example.com/coingecko"
        );
        assert_eq!(config.providers.coingecko.ids.len(), 1);
        assert_eq!(
            config.providers.exchangerate.resolved_api_key().as_deref(),
            Some("secret")
        );
        assert_eq!(config.parser.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.parser.retries, 2);
        // Unset fields keep their defaults
        assert_eq!(config.parser.retry_delay_ms, 500);
        assert_eq!(config.parser.interval_secs, 300);
        assert_eq!(config.expected_codes(), vec!["BTC", "EUR", "USD"]);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.rates_ttl(), Duration::from_secs(300));
        assert_eq!(
            config.logs_dir().unwrap(),
            config.data_dir().unwrap().join("logs")
        );
        assert_eq!(
            config.expected_codes(),
            vec!["BTC", "ETH", "EUR", "GBP", "RUB", "SOL", "USD"]
        );
    }

    #[test]
    fn test_load_from_path_normalizes_base() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), "base_currency: eur\n")?;
        let config = AppConfig::load_from_path(file.path())?;
        assert_eq!(config.base_currency, "EUR");
        Ok(())
    }
}
