//! Summary command - aggregated financial-year totals

use crate::cmd::{resolve_period, EngineArgs};
use crate::config::TaxConfig;
use crate::store::DisposalStore;
use crate::tax::aggregate::{aggregate, PeriodSummary};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct SummaryCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Financial year to report (e.g. 2024-2025, or just 2024)
    #[arg(short, long)]
    year: Option<String>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// Summary data for JSON output
#[derive(Debug, Serialize)]
struct SummaryData {
    financial_year: String,
    method: String,
    base_currency: String,
    disposal_count: usize,
    failed_trades: usize,
    fifo_fallbacks: usize,
    total_gains: String,
    total_losses: String,
    discount_amount: String,
    net_gain: String,
}

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (config, report, store) = self.engine.run()?;
        let period = resolve_period(self.year.as_deref(), &report)?;
        let summary = aggregate(&store.list_disposals(period), period, &config);

        let failed = report.failures().count();
        let fallbacks = report.fallbacks().count();
        let method: crate::tax::MatchingMethod = self.engine.method.into();

        if self.json {
            let data = SummaryData {
                financial_year: summary.period_key.display(),
                method: method.display().to_string(),
                base_currency: config.base_currency.clone(),
                disposal_count: summary.disposals.len(),
                failed_trades: failed,
                fifo_fallbacks: fallbacks,
                total_gains: format!("{:.2}", summary.total_gains),
                total_losses: format!("{:.2}", summary.total_losses),
                discount_amount: format!("{:.2}", summary.discount_amount),
                net_gain: format!("{:.2}", summary.net_gain),
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        } else {
            self.print_summary(&summary, &config, method, failed, fallbacks);
        }
        Ok(())
    }

    fn print_summary(
        &self,
        summary: &PeriodSummary,
        config: &TaxConfig,
        method: crate::tax::MatchingMethod,
        failed: usize,
        fallbacks: usize,
    ) {
        let currency = config.base_currency.as_str();
        println!();
        println!("TAX SUMMARY ({}) - {}", summary.period_key, method);
        println!(
            "Period: {} to {}",
            summary.period_key.start_date(config.fy_start_month),
            summary.period_key.end_date(config.fy_start_month)
        );
        println!();
        println!("CAPITAL GAINS");
        println!("  Disposals: {}", summary.disposals.len());
        println!(
            "  Gains: {} | Losses: {} | Discount: {}",
            money(summary.total_gains, currency),
            money(summary.total_losses, currency),
            money(summary.discount_amount, currency),
        );
        println!("  Net Gain: {}", money_signed(summary.net_gain, currency));
        println!();

        if failed > 0 || fallbacks > 0 {
            println!("DATA QUALITY");
            if failed > 0 {
                println!("  Failed trades: {} (run validate for details)", failed);
            }
            if fallbacks > 0 {
                println!("  Specific-ID fallbacks to FIFO: {}", fallbacks);
            }
            println!();
        }
    }
}

fn money(amount: Decimal, currency: &str) -> String {
    format!("${:.2} {}", amount, currency)
}

fn money_signed(amount: Decimal, currency: &str) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2} {}", amount.abs(), currency)
    } else {
        format!("${:.2} {}", amount, currency)
    }
}
