//! Normalized trade records and their CSV/JSON input formats.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MalformedTradeError {
    #[error("trade is missing an id")]
    MissingId,
    #[error("unknown trade kind '{kind}': {id}")]
    UnknownKind { id: String, kind: String },
    #[error("invalid timestamp '{timestamp}': {id}")]
    InvalidTimestamp { id: String, timestamp: String },
    #[error("missing base asset: {id}")]
    MissingBaseAsset { id: String },
    #[error("base amount must be positive: {id}")]
    NonPositiveBaseAmount { id: String },
    #[error("negative quote amount: {id}")]
    NegativeQuoteAmount { id: String },
    #[error("negative unit price: {id}")]
    NegativeUnitPrice { id: String },
    #[error("negative fee amount: {id}")]
    NegativeFee { id: String },
    #[error("disposal has neither quote amount nor unit price: {id}")]
    MissingValuation { id: String },
    #[error("swap requires a quote asset and quote amount: {id}")]
    IncompleteSwap { id: String },
}

/// What a trade does to the lot ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Acquisition,
    Disposal,
    /// Disposal of the base asset and acquisition of the quote asset
    Swap,
    TransferIn,
    TransferOut,
}

impl TradeKind {
    fn parse(s: &str) -> Option<TradeKind> {
        // Canonical names plus the lowercase forms exchange exports use
        match s.trim() {
            "Acquisition" | "acquisition" | "buy" => Some(TradeKind::Acquisition),
            "Disposal" | "disposal" | "sell" => Some(TradeKind::Disposal),
            "Swap" | "swap" => Some(TradeKind::Swap),
            "TransferIn" | "transfer_in" => Some(TradeKind::TransferIn),
            "TransferOut" | "transfer_out" => Some(TradeKind::TransferOut),
            _ => None,
        }
    }
}

/// A validated trade event. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub id: String,
    #[allow(dead_code)]
    pub source: String,
    #[allow(dead_code)]
    pub source_id: Option<String>,
    pub kind: TradeKind,
    pub timestamp: NaiveDateTime,
    pub base_asset: String,
    pub quote_asset: Option<String>,
    pub base_amount: Decimal,
    pub quote_amount: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub fee_amount: Decimal,
    pub fee_asset: Option<String>,
    #[allow(dead_code)]
    pub wallet_ref: Option<String>,
    #[allow(dead_code)]
    pub notes: Option<String>,
}

/// JSON input root
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeLog {
    pub trades: Vec<TradeRecordRaw>,
}

/// Raw CSV/JSON record, validated into a [`TradeRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeRecordRaw {
    /// Unique identifier for this trade
    pub id: String,
    /// Where the record came from (exchange name, wallet import, manual)
    #[serde(default)]
    pub source: Option<String>,
    /// Identifier in the source system, if different from `id`
    #[serde(default)]
    pub source_id: Option<String>,
    /// Acquisition, Disposal, Swap, TransferIn or TransferOut
    pub kind: String,
    /// When the trade happened (YYYY-MM-DD or YYYY-MM-DDThh:mm:ss)
    pub timestamp: String,
    /// Asset being acquired or disposed
    pub base_asset: String,
    /// Asset on the other side of the trade
    #[serde(default)]
    pub quote_asset: Option<String>,
    /// Amount of the base asset (must be positive)
    #[schemars(with = "f64")]
    pub base_amount: Decimal,
    /// Amount of the quote asset
    #[serde(default)]
    #[schemars(with = "Option<f64>")]
    pub quote_amount: Option<Decimal>,
    /// Price per base unit, in the quote asset
    #[serde(default)]
    #[schemars(with = "Option<f64>")]
    pub unit_price: Option<Decimal>,
    /// Fee paid, in `fee_asset`
    #[serde(default)]
    #[schemars(with = "Option<f64>")]
    pub fee_amount: Option<Decimal>,
    /// Asset the fee was paid in (base currency if absent)
    #[serde(default)]
    pub fee_asset: Option<String>,
    /// Wallet or account the trade settled in
    #[serde(default)]
    pub wallet_ref: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TryFrom<TradeRecordRaw> for TradeRecord {
    type Error = MalformedTradeError;

    fn try_from(raw: TradeRecordRaw) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err(MalformedTradeError::MissingId);
        }
        let id = raw.id;

        let kind = TradeKind::parse(&raw.kind).ok_or_else(|| MalformedTradeError::UnknownKind {
            id: id.clone(),
            kind: raw.kind.clone(),
        })?;

        let timestamp =
            parse_datetime(&raw.timestamp).ok_or_else(|| MalformedTradeError::InvalidTimestamp {
                id: id.clone(),
                timestamp: raw.timestamp.clone(),
            })?;

        if raw.base_asset.trim().is_empty() {
            return Err(MalformedTradeError::MissingBaseAsset { id });
        }
        if raw.base_amount <= Decimal::ZERO {
            return Err(MalformedTradeError::NonPositiveBaseAmount { id });
        }
        if raw.quote_amount.is_some_and(|q| q < Decimal::ZERO) {
            return Err(MalformedTradeError::NegativeQuoteAmount { id });
        }
        if raw.unit_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(MalformedTradeError::NegativeUnitPrice { id });
        }
        let fee_amount = raw.fee_amount.unwrap_or(Decimal::ZERO);
        if fee_amount < Decimal::ZERO {
            return Err(MalformedTradeError::NegativeFee { id });
        }

        // A sale without any valuation has no recoverable proceeds; transfers
        // out are allowed through and dispose at zero proceeds.
        if kind == TradeKind::Disposal && raw.quote_amount.is_none() && raw.unit_price.is_none() {
            return Err(MalformedTradeError::MissingValuation { id });
        }
        if kind == TradeKind::Swap
            && (raw.quote_asset.is_none() || raw.quote_amount.is_none_or(|q| q <= Decimal::ZERO))
        {
            return Err(MalformedTradeError::IncompleteSwap { id });
        }

        Ok(TradeRecord {
            id,
            source: raw.source.unwrap_or_else(|| "manual".to_string()),
            source_id: raw.source_id,
            kind,
            timestamp,
            base_asset: raw.base_asset.trim().to_uppercase(),
            quote_asset: raw.quote_asset.map(|q| q.trim().to_uppercase()),
            base_amount: raw.base_amount,
            quote_amount: raw.quote_amount,
            unit_price: raw.unit_price,
            fee_amount,
            fee_asset: raw.fee_asset.map(|f| f.trim().to_uppercase()),
            wallet_ref: raw.wallet_ref,
            notes: raw.notes,
        })
    }
}

/// Parse a timestamp that may be date-only, datetime, or RFC3339 with offset
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    None
}

/// Read raw trade records from CSV
pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Vec<TradeRecordRaw>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let records: Result<Vec<TradeRecordRaw>, _> = rdr.deserialize::<TradeRecordRaw>().collect();
    let records = records?;
    log::info!("Read {} trade records", records.len());
    Ok(records)
}

/// Read raw trade records from JSON
pub fn read_json<R: Read>(reader: R) -> anyhow::Result<Vec<TradeRecordRaw>> {
    let input: TradeLog = serde_json::from_reader(reader)?;
    log::info!("Read {} trade records", input.trades.len());
    Ok(input.trades)
}
