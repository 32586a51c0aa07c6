use super::{explain, ui};
use crate::core::config::AppConfig;
use crate::core::currency::normalize_code;
use crate::core::rate::{RateSource, RateTable};
use crate::parser::{RatesUpdater, RefreshReport, run_periodic};
use crate::providers::ProviderSelection;
use crate::store::RateStore;
use crate::wallet::{RateQuote, WalletService};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use comfy_table::Cell;
use std::path::Path;
use std::time::Duration;
use tracing::error;

pub async fn get_rate(config: &AppConfig, from: &str, to: &str) -> Result<()> {
    let service = WalletService::from_config(config)?;
    let quote = service.get_rate(from, to).await.map_err(explain)?;
    println!("{}", display_quote(&quote));
    Ok(())
}

fn display_quote(quote: &RateQuote) -> String {
    let updated = quote
        .fetched_at
        .map_or("n/a".to_string(), |at| at.to_rfc3339());
    let mut output = format!(
        "Rate {}→{}: {:.8} (updated: {})",
        quote.from, quote.to, quote.rate, updated
    );
    output.push_str(&format!(
        "\nInverse rate {}→{}: {:.8}",
        quote.to,
        quote.from,
        1.0 / quote.rate
    ));
    if quote.stale {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                "Warning: the rate may be outdated (TTL exceeded). Try update-rates.",
                ui::StyleType::Warning
            )
        ));
    }
    output
}

pub async fn update_rates(config: &AppConfig, selection: ProviderSelection) -> Result<()> {
    let store = RateStore::in_dir(&config.data_dir()?);
    let updater = RatesUpdater::from_config(config, selection, store.clone());

    let spinner = ui::new_spinner("Updating rates...");
    let result = updater.run_update().await;
    spinner.finish_and_clear();

    let report = result.with_context(|| {
        format!(
            "Rates update failed, check the network, rate limits and {}",
            crate::core::config::API_KEY_ENV
        )
    })?;
    println!("{}", display_report(&report, store.cache_path()));
    Ok(())
}

fn display_report(report: &RefreshReport, cache_path: &Path) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Source"),
        ui::header_cell("Rates"),
        ui::header_cell("Status"),
    ]);
    for source in &report.sources {
        let (count, error) = match &source.result {
            Ok(count) => (Some(*count), None),
            Err(e) => (None, Some(e.to_string())),
        };
        table.add_row(vec![
            Cell::new(&source.name),
            ui::format_optional_cell(count, |c| c.to_string()),
            ui::status_cell(error.as_deref()),
        ]);
    }

    let mut output = table.to_string();
    output.push_str(&format!(
        "\n\nWrote {} rates to {}",
        report.total,
        cache_path.display()
    ));
    if !report.fallback.is_empty() {
        output.push_str(&format!(
            "\nKept cached rates for: {}",
            report.fallback.join(", ")
        ));
    }
    for warning in &report.warnings {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(warning, ui::StyleType::Warning)
        ));
    }
    let summary = if report.ok() {
        ui::style_text("Update successful.", ui::StyleType::TotalValue)
    } else {
        ui::style_text("Update completed with errors.", ui::StyleType::Error)
    };
    output.push_str(&format!(
        "\n{} Total rates updated: {}. Last refresh: {}",
        summary,
        report.total,
        report.last_refresh.to_rfc3339()
    ));
    output
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateRow {
    pub pair: String,
    pub rate: f64,
    pub source: RateSource,
    pub fetched_at: DateTime<Utc>,
}

/// Cached rates re-quoted in `base`, filtered to one currency or the `top`
/// most expensive ones.
pub fn select_rates(
    table: &RateTable,
    quoted_in: &str,
    currency: Option<&str>,
    top: Option<usize>,
    base: Option<&str>,
) -> Result<Vec<RateRow>> {
    let base = match base {
        Some(code) => normalize_code(code)?,
        None => quoted_in.to_string(),
    };
    let currency = currency.map(normalize_code).transpose()?;
    let base_price = if base == quoted_in {
        1.0
    } else {
        table
            .get(&base)
            .map(|e| e.rate)
            .ok_or_else(|| anyhow!("No cached rate for base currency {}", base))?
    };

    let mut rows: Vec<RateRow> = table
        .iter()
        .filter(|e| e.currency_code != base)
        .filter(|e| currency.as_ref().is_none_or(|c| *c == e.currency_code))
        .map(|e| RateRow {
            pair: format!("{}_{}", e.currency_code, base),
            rate: e.rate / base_price,
            source: e.source,
            fetched_at: e.fetched_at,
        })
        .collect();

    match top {
        Some(n) => {
            rows.sort_by(|a, b| b.rate.total_cmp(&a.rate));
            rows.truncate(n);
        }
        None => rows.sort_by(|a, b| a.pair.cmp(&b.pair)),
    }
    Ok(rows)
}

fn display_rates(rows: &[RateRow], updated_at: Option<DateTime<Utc>>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
        ui::header_cell("Updated at"),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.pair),
            ui::number_cell(row.rate, 8),
            Cell::new(row.source.to_string()),
            Cell::new(row.fetched_at.to_rfc3339()),
        ]);
    }
    let updated = updated_at.map_or("n/a".to_string(), |at| at.to_rfc3339());
    format!("Rates from cache (updated at {updated}):\n{table}")
}

pub fn show_rates(
    config: &AppConfig,
    currency: Option<&str>,
    top: Option<usize>,
    base: Option<&str>,
) -> Result<()> {
    let store = RateStore::in_dir(&config.data_dir()?);
    let table = store.read_cache()?;
    if table.is_empty() {
        println!("The local rate cache is empty. Run 'update-rates' to load data.");
        return Ok(());
    }

    let rows = select_rates(&table, &config.base_currency, currency, top, base)?;
    if rows.is_empty() {
        println!(
            "No rate for '{}' in the cache.",
            currency.unwrap_or("...").to_uppercase()
        );
        return Ok(());
    }
    println!("{}", display_rates(&rows, table.newest()));
    Ok(())
}

pub async fn schedule(config: &AppConfig, interval: Option<u64>) -> Result<()> {
    let store = RateStore::in_dir(&config.data_dir()?);
    let updater = RatesUpdater::from_config(config, ProviderSelection::All, store);
    let interval = Duration::from_secs(interval.unwrap_or(config.parser.interval_secs));

    println!(
        "Updating rates every {}s, press Ctrl-C to stop.",
        interval.as_secs().max(1)
    );
    let cycles = run_periodic(&updater, interval, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    })
    .await;
    println!("Stopped after {cycles} cycles.");
    Ok(())
}
