//! Report serialization: a [`PeriodSummary`] rendered as CSV, JSON or
//! plain text. Formatting only; no business logic lives here.

use crate::tax::aggregate::PeriodSummary;
use rust_decimal::Decimal;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
    Text,
}

/// Write a summary in the requested format
pub fn write_report<W: Write>(
    summary: &PeriodSummary,
    format: ReportFormat,
    base_currency: &str,
    writer: W,
) -> anyhow::Result<()> {
    match format {
        ReportFormat::Csv => write_csv(summary, base_currency, writer),
        ReportFormat::Json => write_json(summary, writer),
        ReportFormat::Text => write_text(summary, base_currency, writer),
    }
}

/// Header + one row per disposal + trailing summary rows
pub fn write_csv<W: Write>(
    summary: &PeriodSummary,
    base_currency: &str,
    writer: W,
) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let proceeds_header = format!("Proceeds ({})", base_currency);
    let cost_header = format!("Cost Basis ({})", base_currency);
    let gain_header = format!("Gain ({})", base_currency);
    wtr.write_record([
        "Date",
        "Asset",
        "Amount",
        proceeds_header.as_str(),
        cost_header.as_str(),
        gain_header.as_str(),
        "Holding Period (Days)",
        "Discount Eligible",
        "Personal Use",
    ])?;

    for d in &summary.disposals {
        wtr.write_record([
            d.disposed_at.format("%Y-%m-%d").to_string(),
            d.asset.clone(),
            d.amount.to_string(),
            d.proceeds.round_dp(2).to_string(),
            d.cost_basis.round_dp(2).to_string(),
            d.gain.round_dp(2).to_string(),
            d.holding_period_days.to_string(),
            yes_no(d.qualifies_for_discount),
            yes_no(d.is_personal_use),
        ])?;
    }

    wtr.write_record([""; 9])?;
    for (label, value) in [
        ("Total Gains", summary.total_gains),
        ("Total Losses", summary.total_losses),
        ("Discount Amount", summary.discount_amount),
        ("Net Gain", summary.net_gain),
    ] {
        let mut row = vec![label.to_string(), value.round_dp(2).to_string()];
        row.resize(9, String::new());
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Direct structural serialization
pub fn write_json<W: Write>(summary: &PeriodSummary, mut writer: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    Ok(())
}

/// Human-readable report
pub fn write_text<W: Write>(
    summary: &PeriodSummary,
    base_currency: &str,
    mut writer: W,
) -> anyhow::Result<()> {
    writeln!(writer, "CAPITAL GAINS REPORT")?;
    writeln!(writer, "Financial Year: {}", summary.period_key)?;
    writeln!(writer)?;
    writeln!(writer, "SUMMARY")?;
    writeln!(writer, "=======")?;
    writeln!(writer, "Total Gains: {}", money(summary.total_gains, base_currency))?;
    writeln!(writer, "Total Losses: {}", money(summary.total_losses, base_currency))?;
    writeln!(writer, "Discount Amount: {}", money(summary.discount_amount, base_currency))?;
    writeln!(writer, "Net Gain: {}", money(summary.net_gain, base_currency))?;
    writeln!(writer)?;
    writeln!(writer, "DISPOSALS")?;
    writeln!(writer, "=========")?;

    if summary.disposals.is_empty() {
        writeln!(writer, "(none)")?;
        return Ok(());
    }
    for d in &summary.disposals {
        writeln!(writer)?;
        writeln!(writer, "Date: {}", d.disposed_at.format("%Y-%m-%d"))?;
        writeln!(writer, "Asset: {}", d.asset)?;
        writeln!(writer, "Amount: {}", d.amount)?;
        writeln!(writer, "Proceeds: {}", money(d.proceeds, base_currency))?;
        writeln!(writer, "Cost Basis: {}", money(d.cost_basis, base_currency))?;
        writeln!(writer, "Gain: {}", money(d.gain, base_currency))?;
        writeln!(writer, "Holding Period: {} days", d.holding_period_days)?;
        writeln!(writer, "Discount Eligible: {}", yes_no(d.qualifies_for_discount))?;
        writeln!(writer, "---")?;
    }
    Ok(())
}

fn yes_no(flag: bool) -> String {
    if flag { "Yes" } else { "No" }.to_string()
}

fn money(amount: Decimal, currency: &str) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2} {}", amount.abs(), currency)
    } else {
        format!("${:.2} {}", amount, currency)
    }
}
