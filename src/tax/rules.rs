//! Financial year periods and the jurisdiction rule predicates.

use crate::config::TaxConfig;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::str::FromStr;

/// A financial year, identified by the calendar year it starts in.
/// With the default July start, `FinancialYear(2024)` is 2024-07-01 to
/// 2025-06-30 and displays as "2024-2025".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FinancialYear(pub i32);

impl FinancialYear {
    /// Financial year containing `date` for a year starting in `fy_start_month`
    pub fn from_date(date: NaiveDate, fy_start_month: u32) -> Self {
        let year = date.year();
        if date.month() >= fy_start_month {
            FinancialYear(year)
        } else {
            FinancialYear(year - 1)
        }
    }

    /// First day of the financial year
    pub fn start_date(&self, fy_start_month: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, fy_start_month, 1).expect("valid fy start month")
    }

    /// Last day of the financial year
    pub fn end_date(&self, fy_start_month: u32) -> NaiveDate {
        self.start_date(fy_start_month)
            .checked_add_months(chrono::Months::new(12))
            .and_then(|d| d.pred_opt())
            .expect("valid fy end date")
    }

    /// Display as "2024-2025"
    pub fn display(&self) -> String {
        format!("{}-{}", self.0, self.0 + 1)
    }
}

impl std::fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl FromStr for FinancialYear {
    type Err = String;

    /// Accepts "2024-2025" or just the starting year "2024"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let start = s.split('-').next().unwrap_or(s).trim();
        let year: i32 = start
            .parse()
            .map_err(|_| format!("invalid financial year '{}'", s))?;
        if let Some((_, end)) = s.split_once('-') {
            let end: i32 = end
                .trim()
                .parse()
                .map_err(|_| format!("invalid financial year '{}'", s))?;
            if end != year + 1 {
                return Err(format!("invalid financial year '{}'", s));
            }
        }
        Ok(FinancialYear(year))
    }
}

impl Serialize for FinancialYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display())
    }
}

/// Disposals with proceeds under the configured threshold are personal use
/// and excluded from gain/loss totals. Exactly the threshold is not exempt.
pub fn is_personal_use(proceeds: Decimal, config: &TaxConfig) -> bool {
    proceeds < config.personal_use_threshold
}

/// The discount requires holding strictly longer than the configured period.
pub fn qualifies_for_discount(holding_period_days: i64, config: &TaxConfig) -> bool {
    holding_period_days > config.discount_period_days
}
