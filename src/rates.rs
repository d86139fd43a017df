//! Historical rate lookup for valuing non-base-currency quote amounts.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RateLookupError {
    #[error("no rate source configured, cannot value {asset} at {at}")]
    NoSource { asset: String, at: NaiveDateTime },
    #[error("no {asset} rate at or before {at}")]
    RateUnavailable { asset: String, at: NaiveDateTime },
}

/// Converts one unit of `asset` into the configured base currency.
///
/// The engine never assumes a 1:1 rate; a missing rate surfaces as a
/// per-trade [`RateLookupError`].
pub trait RateLookup {
    fn rate_to_base(&self, asset: &str, at: NaiveDateTime) -> Result<Decimal, RateLookupError>;
}

#[derive(Debug, Deserialize)]
struct RateCsvRecord {
    asset: String,
    timestamp: String,
    rate: Decimal,
}

/// In-memory rate table, one time-series per asset.
#[derive(Debug, Default)]
pub struct RateTable {
    rates: HashMap<String, Vec<(NaiveDateTime, Decimal)>>,
}

impl RateTable {
    pub fn new() -> Self {
        RateTable::default()
    }

    pub fn insert(&mut self, asset: &str, at: NaiveDateTime, rate: Decimal) {
        let series = self.rates.entry(asset.to_uppercase()).or_default();
        series.push((at, rate));
        series.sort_by_key(|(t, _)| *t);
    }

    /// Read rates from CSV with columns `asset,timestamp,rate`
    pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<RateTable> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut table = RateTable::new();
        for record in rdr.deserialize::<RateCsvRecord>() {
            let record = record?;
            let at = crate::trade::parse_datetime(&record.timestamp)
                .ok_or_else(|| anyhow::anyhow!("invalid rate timestamp {}", record.timestamp))?;
            table.insert(&record.asset, at, record.rate);
        }
        log::info!("Loaded rates for {} assets", table.rates.len());
        Ok(table)
    }
}

impl RateLookup for RateTable {
    /// Most recent rate at or before `at`
    fn rate_to_base(&self, asset: &str, at: NaiveDateTime) -> Result<Decimal, RateLookupError> {
        let series = self
            .rates
            .get(&asset.to_uppercase())
            .ok_or_else(|| RateLookupError::RateUnavailable {
                asset: asset.to_string(),
                at,
            })?;
        series
            .iter()
            .rev()
            .find(|(t, _)| *t <= at)
            .map(|(_, rate)| *rate)
            .ok_or_else(|| RateLookupError::RateUnavailable {
                asset: asset.to_string(),
                at,
            })
    }
}
