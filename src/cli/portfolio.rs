use super::{explain, ui};
use crate::core::config::AppConfig;
use crate::wallet::{PortfolioView, TradeReceipt, TradeSide, WalletService};
use anyhow::Result;
use comfy_table::Cell;

impl PortfolioView {
    pub fn display_as_table(&self) -> String {
        if self.rows.is_empty() {
            return format!("Portfolio of '{}' is empty.", self.username);
        }

        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Currency"),
            ui::header_cell("Balance"),
            ui::header_cell(&format!("Value in {}", self.base)),
        ]);
        for row in &self.rows {
            table.add_row(vec![
                Cell::new(&row.code),
                ui::number_cell(row.balance, 4),
                ui::number_cell(row.value, 4),
            ]);
        }

        let mut output = format!(
            "Portfolio of '{}' (base: {}):\n\n",
            ui::style_text(&self.username, ui::StyleType::Title),
            self.base
        );
        output.push_str(&table.to_string());
        output.push_str(&format!(
            "\n\n{} {}",
            ui::style_text("TOTAL:", ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:.4} {}", self.total, self.base),
                ui::StyleType::TotalValue
            )
        ));
        if self.stale {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    "Some rates are older than the configured TTL, try update-rates.",
                    ui::StyleType::Warning
                )
            ));
        }
        output
    }
}

impl TradeReceipt {
    pub fn display(&self) -> String {
        let (verb, total_label) = match self.side {
            TradeSide::Buy => ("Purchase", "Estimated cost"),
            TradeSide::Sell => ("Sale", "Estimated proceeds"),
        };
        let mut output = format!(
            "{} completed: {:.4} {} at {:.4} USD/{}\n{}: {:.4} USD\nChanges: {}",
            verb,
            self.amount,
            self.code,
            self.rate,
            self.code,
            total_label,
            self.usd_amount,
            self.changes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
        if self.stale {
            output.push_str(&format!(
                "\n{}",
                ui::style_text("The rate used is stale.", ui::StyleType::Warning)
            ));
        }
        output
    }
}

pub async fn show_portfolio(config: &AppConfig, base: Option<&str>) -> Result<()> {
    let service = WalletService::from_config(config)?;
    let session = service.current_session().map_err(explain)?;
    let view = service
        .show_portfolio(&session, base)
        .await
        .map_err(explain)?;
    println!("{}", view.display_as_table());
    Ok(())
}

pub async fn trade(config: &AppConfig, side: TradeSide, currency: &str, amount: f64) -> Result<()> {
    let service = WalletService::from_config(config)?;
    let session = service.current_session().map_err(explain)?;
    let receipt = match side {
        TradeSide::Buy => service.buy(&session, currency, amount).await,
        TradeSide::Sell => service.sell(&session, currency, amount).await,
    }
    .map_err(explain)?;
    println!("{}", receipt.display());
    Ok(())
}
