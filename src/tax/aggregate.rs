//! Rolls disposal records for one financial year into a summary.

use crate::config::TaxConfig;
use crate::tax::processor::DisposalRecord;
use crate::tax::rules::FinancialYear;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

/// One disposal line in a period summary. `gain` is the full realized
/// gain before any discount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisposalSummary {
    pub disposed_at: NaiveDateTime,
    pub asset: String,
    pub amount: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub gain: Decimal,
    pub holding_period_days: i64,
    pub qualifies_for_discount: bool,
    pub is_personal_use: bool,
}

impl From<&DisposalRecord> for DisposalSummary {
    fn from(d: &DisposalRecord) -> Self {
        DisposalSummary {
            disposed_at: d.disposed_at,
            asset: d.asset.clone(),
            amount: d.amount,
            proceeds: d.proceeds,
            cost_basis: d.cost_basis,
            gain: d.gain,
            holding_period_days: d.holding_period_days,
            qualifies_for_discount: d.qualifies_for_discount,
            is_personal_use: d.is_personal_use,
        }
    }
}

/// Derived view over one financial year. Recomputed on demand, never a
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub period_key: FinancialYear,
    pub total_gains: Decimal,
    pub total_losses: Decimal,
    pub discount_amount: Decimal,
    pub net_gain: Decimal,
    pub disposals: Vec<DisposalSummary>,
}

/// Aggregate the disposals falling in `period_key`.
///
/// Personal-use disposals are excluded outright. A qualifying gain is
/// discounted first and the *reduced* gain bucketed; applying the discount
/// after bucketing would change the result whenever discounted gains and
/// losses coexist in the same period.
pub fn aggregate(
    disposals: &[DisposalRecord],
    period_key: FinancialYear,
    config: &TaxConfig,
) -> PeriodSummary {
    let mut total_gains = Decimal::ZERO;
    let mut total_losses = Decimal::ZERO;
    let mut discount_amount = Decimal::ZERO;
    let mut rows = Vec::new();

    for disposal in disposals.iter().filter(|d| d.period_key == period_key) {
        if disposal.is_personal_use {
            log::debug!(
                "disposal {} excluded as personal use ({} proceeds)",
                disposal.id,
                disposal.proceeds
            );
            continue;
        }

        let mut counted = disposal.gain;
        if disposal.qualifies_for_discount && counted > Decimal::ZERO {
            let discount = counted * config.discount_rate;
            discount_amount += discount;
            counted -= discount;
        }

        if counted > Decimal::ZERO {
            total_gains += counted;
        } else {
            total_losses += counted.abs();
        }

        rows.push(DisposalSummary::from(disposal));
    }

    PeriodSummary {
        period_key,
        total_gains,
        total_losses,
        discount_amount,
        net_gain: total_gains - total_losses,
        disposals: rows,
    }
}
