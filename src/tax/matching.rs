//! Lot matching strategies: which open lots a disposal consumes, and in
//! what order.

use crate::tax::ledger::{LotId, TaxLot, AMOUNT_EPSILON};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UnsupportedMatchingPolicyError {
    #[error("selection for trade {trade_id} references no open lot from trade {lot_ref}")]
    UnknownLotRef { trade_id: String, lot_ref: String },
    #[error("selection for trade {trade_id} draws {requested} from lot {lot_id} with {remaining} remaining")]
    SelectionOverdraw {
        trade_id: String,
        lot_id: LotId,
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("selection amounts for trade {trade_id} must be positive")]
    NonPositiveSelection { trade_id: String },
}

/// Lot consumption order for disposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchingMethod {
    /// Oldest acquisition first
    #[default]
    Fifo,
    /// Newest acquisition first
    Lifo,
    /// Caller-supplied lot selection, falling back to FIFO when none given
    SpecificId,
}

impl MatchingMethod {
    pub fn display(&self) -> &'static str {
        match self {
            MatchingMethod::Fifo => "FIFO",
            MatchingMethod::Lifo => "LIFO",
            MatchingMethod::SpecificId => "Specific-ID",
        }
    }
}

impl std::fmt::Display for MatchingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One slice of a planned disposal
#[derive(Debug, Clone, PartialEq)]
pub struct LotPortion {
    pub lot_id: LotId,
    pub amount: Decimal,
}

/// Result of planning a disposal against the open lots. `matched` can fall
/// short of the requested amount; the processor turns that into a shortfall
/// error after recording what did match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPlan {
    pub portions: Vec<LotPortion>,
    pub matched: Decimal,
    /// True when Specific-ID fell back to FIFO for any part of the amount
    pub fifo_fallback: bool,
}

/// One explicit lot choice: the acquisition trade that created the lot,
/// and how much to draw from it.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectionEntry {
    pub lot: String,
    pub amount: Decimal,
}

/// Explicit selections for Specific-ID matching, keyed by disposal trade id.
///
/// Lots are addressed by the id of the acquisition trade that created them,
/// since internal lot ids are assigned during the run the caller has not
/// seen yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotSelections(pub HashMap<String, Vec<SelectionEntry>>);

impl LotSelections {
    pub fn for_trade(&self, trade_id: &str) -> Option<&[SelectionEntry]> {
        self.0.get(trade_id).map(Vec::as_slice)
    }
}

impl MatchingMethod {
    /// Plan which lots a disposal of `amount_needed` consumes.
    ///
    /// `open_lots` must be in acquisition order, the way the ledger hands
    /// them out; ties keep their stable insertion order.
    pub fn plan(
        &self,
        trade_id: &str,
        open_lots: &[&TaxLot],
        amount_needed: Decimal,
        selections: Option<&[SelectionEntry]>,
    ) -> Result<MatchPlan, UnsupportedMatchingPolicyError> {
        match self {
            MatchingMethod::Fifo => Ok(walk(open_lots.iter().copied(), amount_needed, false)),
            MatchingMethod::Lifo => Ok(walk(open_lots.iter().rev().copied(), amount_needed, false)),
            MatchingMethod::SpecificId => match selections {
                Some(entries) if !entries.is_empty() => {
                    plan_specific(trade_id, open_lots, amount_needed, entries)
                }
                // No selection supplied: explicit, observable FIFO fallback
                _ => Ok(walk(open_lots.iter().copied(), amount_needed, true)),
            },
        }
    }
}

fn walk<'a, I>(lots: I, amount_needed: Decimal, fifo_fallback: bool) -> MatchPlan
where
    I: Iterator<Item = &'a TaxLot>,
{
    let mut plan = MatchPlan {
        fifo_fallback,
        ..MatchPlan::default()
    };
    let mut remaining = amount_needed;
    for lot in lots {
        if remaining <= AMOUNT_EPSILON {
            break;
        }
        let take = remaining.min(lot.remaining_amount);
        plan.portions.push(LotPortion {
            lot_id: lot.id,
            amount: take,
        });
        plan.matched += take;
        remaining -= take;
    }
    plan
}

fn plan_specific(
    trade_id: &str,
    open_lots: &[&TaxLot],
    amount_needed: Decimal,
    entries: &[SelectionEntry],
) -> Result<MatchPlan, UnsupportedMatchingPolicyError> {
    let mut plan = MatchPlan::default();
    // remaining capacity per lot as the plan draws it down
    let mut capacity: HashMap<LotId, Decimal> =
        open_lots.iter().map(|l| (l.id, l.remaining_amount)).collect();

    for entry in entries {
        if entry.amount <= Decimal::ZERO {
            return Err(UnsupportedMatchingPolicyError::NonPositiveSelection {
                trade_id: trade_id.to_string(),
            });
        }
        let lot = open_lots
            .iter()
            .find(|l| l.source_trade_id == entry.lot && capacity[&l.id] > AMOUNT_EPSILON)
            .ok_or_else(|| UnsupportedMatchingPolicyError::UnknownLotRef {
                trade_id: trade_id.to_string(),
                lot_ref: entry.lot.clone(),
            })?;
        let remaining = capacity[&lot.id];
        if entry.amount > remaining + AMOUNT_EPSILON {
            return Err(UnsupportedMatchingPolicyError::SelectionOverdraw {
                trade_id: trade_id.to_string(),
                lot_id: lot.id,
                requested: entry.amount,
                remaining,
            });
        }
        plan.portions.push(LotPortion {
            lot_id: lot.id,
            amount: entry.amount,
        });
        plan.matched += entry.amount;
        *capacity.get_mut(&lot.id).expect("capacity tracked for open lot") -= entry.amount;
    }

    // Selections covering less than the disposal fall back to FIFO for the
    // remainder, flagged so the caller can see the policy was not fully honored.
    if plan.matched + AMOUNT_EPSILON < amount_needed {
        let mut remaining_needed = amount_needed - plan.matched;
        for lot in open_lots {
            if remaining_needed <= AMOUNT_EPSILON {
                break;
            }
            let available = capacity[&lot.id];
            if available <= AMOUNT_EPSILON {
                continue;
            }
            let take = remaining_needed.min(available);
            plan.portions.push(LotPortion {
                lot_id: lot.id,
                amount: take,
            });
            plan.matched += take;
            remaining_needed -= take;
        }
        plan.fifo_fallback = true;
    }

    Ok(plan)
}
