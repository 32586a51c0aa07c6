pub mod coingecko;
pub mod exchangerate;
pub mod util;

use crate::core::config::AppConfig;
use crate::core::rate::RateProvider;
use anyhow::{Result, anyhow};
use coingecko::CoinGeckoProvider;
use exchangerate::ExchangeRateProvider;
use std::str::FromStr;
use std::sync::Arc;

/// Which providers a refresh cycle should call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderSelection {
    #[default]
    All,
    CoinGecko,
    ExchangeRate,
}

impl FromStr for ProviderSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Ok(ProviderSelection::All),
            "coingecko" => Ok(ProviderSelection::CoinGecko),
            "exchangerate" | "exchangerate-api" | "exchangerateapi" => {
                Ok(ProviderSelection::ExchangeRate)
            }
            _ => Err(anyhow!(
                "Unknown source '{}', use coingecko, exchangerate or all",
                s
            )),
        }
    }
}

pub fn build_providers(
    config: &AppConfig,
    selection: ProviderSelection,
) -> Vec<Arc<dyn RateProvider>> {
    let mut providers: Vec<Arc<dyn RateProvider>> = Vec::new();
    if matches!(
        selection,
        ProviderSelection::All | ProviderSelection::CoinGecko
    ) {
        providers.push(Arc::new(CoinGeckoProvider::new(
            &config.providers.coingecko,
            &config.base_currency,
        )));
    }
    if matches!(
        selection,
        ProviderSelection::All | ProviderSelection::ExchangeRate
    ) {
        providers.push(Arc::new(ExchangeRateProvider::new(
            &config.providers.exchangerate,
            &config.base_currency,
        )));
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateSource;

    #[test]
    fn test_selection_parsing() {
        assert_eq!("".parse::<ProviderSelection>().unwrap(), ProviderSelection::All);
        assert_eq!(
            "CoinGecko".parse::<ProviderSelection>().unwrap(),
            ProviderSelection::CoinGecko
        );
        assert_eq!(
            "exchangerate-api".parse::<ProviderSelection>().unwrap(),
            ProviderSelection::ExchangeRate
        );
        assert!("yahoo".parse::<ProviderSelection>().is_err());
    }

    #[test]
    fn test_build_providers() {
        let config = AppConfig::default();
        let all = build_providers(&config, ProviderSelection::All);
        let sources: Vec<_> = all.iter().map(|p| p.source()).collect();
        assert_eq!(
            sources,
            vec![RateSource::CryptoProvider, RateSource::FiatProvider]
        );

        let fiat = build_providers(&config, ProviderSelection::ExchangeRate);
        assert_eq!(fiat.len(), 1);
        assert_eq!(fiat[0].name(), "ExchangeRate-API");
    }
}
