//! Jurisdiction configuration for gain/loss treatment.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Jurisdiction parameters used by the rule evaluator and aggregator.
///
/// Defaults match the Australian treatment the tool grew up with: AUD base
/// currency, July financial year start, a 10,000 personal-use threshold and
/// a 50% discount for assets held longer than a year. All of them can be
/// overridden from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaxConfig {
    /// Currency all proceeds and cost bases are expressed in
    pub base_currency: String,
    /// First month of the financial year (1-12)
    pub fy_start_month: u32,
    /// Disposals with proceeds under this amount are personal use
    pub personal_use_threshold: Decimal,
    /// Holding period (days) that must be exceeded for the discount
    pub discount_period_days: i64,
    /// Fraction of a qualifying gain that is discounted
    pub discount_rate: Decimal,
}

impl Default for TaxConfig {
    fn default() -> Self {
        TaxConfig {
            base_currency: "AUD".to_string(),
            fy_start_month: 7,
            personal_use_threshold: dec!(10000),
            discount_period_days: 365,
            discount_rate: dec!(0.5),
        }
    }
}

impl TaxConfig {
    /// Load from a JSON file, falling back to defaults for absent fields.
    pub fn from_json_file(path: &Path) -> anyhow::Result<TaxConfig> {
        let file = File::open(path)?;
        let config: TaxConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.base_currency.trim().is_empty() {
            anyhow::bail!("base_currency must not be empty");
        }
        if !(1..=12).contains(&self.fy_start_month) {
            anyhow::bail!("fy_start_month must be 1-12, got {}", self.fy_start_month);
        }
        if self.discount_rate < Decimal::ZERO || self.discount_rate > Decimal::ONE {
            anyhow::bail!("discount_rate must be between 0 and 1, got {}", self.discount_rate);
        }
        if self.discount_period_days < 0 {
            anyhow::bail!("discount_period_days must not be negative");
        }
        Ok(())
    }

    pub fn is_base_currency(&self, asset: &str) -> bool {
        asset.eq_ignore_ascii_case(&self.base_currency)
    }
}
