//! Lots command - ledger state after processing the trade log

use crate::cmd::EngineArgs;
use crate::store::LotStore;
use crate::tax::ledger::TaxLot;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct LotsCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Filter by asset (e.g. BTC, ETH)
    #[arg(short, long)]
    asset: Option<String>,

    /// Only show lots with a remaining balance
    #[arg(long)]
    open: bool,

    /// Output as JSON instead of a formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Tabled)]
struct LotRow {
    id: u64,
    asset: String,
    acquired: String,
    trade: String,
    original: String,
    remaining: String,
    unit_cost: String,
    total_cost: String,
}

impl From<&TaxLot> for LotRow {
    fn from(lot: &TaxLot) -> Self {
        LotRow {
            id: lot.id,
            asset: lot.asset.clone(),
            acquired: lot.acquired_at.format("%Y-%m-%d").to_string(),
            trade: lot.source_trade_id.clone(),
            original: format_quantity(lot.original_amount),
            remaining: format_quantity(lot.remaining_amount),
            unit_cost: format!("{:.2}", lot.unit_cost_basis),
            total_cost: format!("{:.2}", lot.total_cost_basis),
        }
    }
}

#[derive(Debug, Serialize)]
struct LotJson {
    id: u64,
    asset: String,
    acquired_at: String,
    source_trade_id: String,
    original_amount: Decimal,
    remaining_amount: Decimal,
    unit_cost_basis: Decimal,
    total_cost_basis: Decimal,
    open: bool,
}

impl LotsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (_, report, store) = self.engine.run()?;
        let asset_filter = self.asset.as_deref().map(str::to_uppercase);

        let mut lots: Vec<TaxLot> = Vec::new();
        for asset in report
            .ledger
            .assets()
            .iter()
            .filter(|asset| asset_filter.as_deref().is_none_or(|f| f == **asset))
        {
            if self.open {
                lots.extend(store.list_open_lots(asset));
            } else {
                lots.extend(report.ledger.lots_for(asset).iter().cloned());
            }
        }

        if self.json {
            let rows: Vec<LotJson> = lots
                .iter()
                .map(|lot| LotJson {
                    id: lot.id,
                    asset: lot.asset.clone(),
                    acquired_at: lot.acquired_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    source_trade_id: lot.source_trade_id.clone(),
                    original_amount: lot.original_amount,
                    remaining_amount: lot.remaining_amount,
                    unit_cost_basis: lot.unit_cost_basis,
                    total_cost_basis: lot.total_cost_basis,
                    open: lot.is_open(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        if lots.is_empty() {
            println!("No lots found");
            return Ok(());
        }

        let rows: Vec<LotRow> = lots.iter().map(LotRow::from).collect();
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        Ok(())
    }
}

fn format_quantity(quantity: Decimal) -> String {
    quantity.normalize().to_string()
}
