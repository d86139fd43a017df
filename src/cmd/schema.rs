//! Schema command - print expected input formats

use crate::trade::TradeLog;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: json-schema or csv-header
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the input format
    JsonSchema,
    /// CSV header row with column names
    CsvHeader,
    /// CSV column descriptions
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => self.print_json_schema(),
            SchemaFormat::CsvHeader => self.print_csv_header(),
            SchemaFormat::CsvFields => self.print_csv_fields(),
        }
    }

    fn print_json_schema(&self) -> anyhow::Result<()> {
        let schema = schema_for!(TradeLog);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }

    fn print_csv_header(&self) -> anyhow::Result<()> {
        println!("{}", CSV_COLUMNS.join(","));
        Ok(())
    }

    fn print_csv_fields(&self) -> anyhow::Result<()> {
        println!("CSV Input Format");
        println!("================");
        println!();
        for (name, required, description) in CSV_FIELD_DESCRIPTIONS {
            let req = if *required { "required" } else { "optional" };
            println!("{:14} ({:8})  {}", name, req, description);
        }
        println!();
        println!("Amounts are in the asset's own units; values convert to the");
        println!("configured base currency via quote_asset and the rate table.");
        Ok(())
    }
}

const CSV_COLUMNS: &[&str] = &[
    "id",
    "source",
    "source_id",
    "kind",
    "timestamp",
    "base_asset",
    "quote_asset",
    "base_amount",
    "quote_amount",
    "unit_price",
    "fee_amount",
    "fee_asset",
    "wallet_ref",
    "notes",
];

const CSV_FIELD_DESCRIPTIONS: &[(&str, bool, &str)] = &[
    ("id", true, "Unique identifier for this trade"),
    ("source", false, "Where the record came from (exchange, manual)"),
    ("source_id", false, "Identifier in the source system"),
    (
        "kind",
        true,
        "Acquisition, Disposal, Swap, TransferIn, TransferOut (or buy/sell/swap/transfer_in/transfer_out)",
    ),
    (
        "timestamp",
        true,
        "Trade time (YYYY-MM-DD or YYYY-MM-DDThh:mm:ss)",
    ),
    ("base_asset", true, "Asset being acquired or disposed"),
    ("quote_asset", false, "Asset on the other side of the trade"),
    ("base_amount", true, "Amount of the base asset (positive)"),
    ("quote_amount", false, "Amount of the quote asset"),
    ("unit_price", false, "Price per base unit, in the quote asset"),
    ("fee_amount", false, "Fee paid"),
    ("fee_asset", false, "Fee asset (base currency if absent)"),
    ("wallet_ref", false, "Wallet or account the trade settled in"),
    ("notes", false, "Optional description"),
];
