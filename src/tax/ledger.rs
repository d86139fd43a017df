//! The lot ledger: discrete acquisition batches and their consumption.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Tolerance for amount arithmetic. Absorbs rounding in partial-lot
/// consumption; not a business rule.
pub const AMOUNT_EPSILON: Decimal = dec!(0.00000001);

pub type LotId = u64;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InsufficientLotError {
    #[error("lot {lot_id} has {remaining} {asset} remaining, cannot consume {requested}")]
    LotOverdrawn {
        lot_id: LotId,
        asset: String,
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("open lots for {asset} cover {matched} of {requested}, short by {shortfall}")]
    Shortfall {
        asset: String,
        requested: Decimal,
        matched: Decimal,
        shortfall: Decimal,
    },
    #[error("unknown lot id {0}")]
    UnknownLot(LotId),
}

impl InsufficientLotError {
    /// Unmatched remainder, where the error carries one
    #[cfg(test)]
    pub fn shortfall(&self) -> Option<Decimal> {
        match self {
            InsufficientLotError::Shortfall { shortfall, .. } => Some(*shortfall),
            _ => None,
        }
    }
}

/// A discrete batch of an asset acquired at one time and price.
/// Never deleted; a consumed lot stays in the ledger for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxLot {
    pub id: LotId,
    pub asset: String,
    pub acquired_at: NaiveDateTime,
    pub source_trade_id: String,
    pub original_amount: Decimal,
    pub remaining_amount: Decimal,
    pub unit_cost_basis: Decimal,
    pub total_cost_basis: Decimal,
}

impl TaxLot {
    pub fn is_open(&self) -> bool {
        self.remaining_amount > AMOUNT_EPSILON
    }
}

/// Owns every lot and is the only place lots are mutated.
///
/// Lots are stored per asset in arrival order, which is acquisition order
/// because the processor sorts trades by timestamp first; same-timestamp
/// lots keep their stable insertion order. Matching direction is the
/// strategy's concern, the ledger never re-sorts.
#[derive(Debug, Default)]
pub struct LotLedger {
    lots: HashMap<String, Vec<TaxLot>>,
    asset_of: HashMap<LotId, String>,
    next_id: LotId,
}

impl LotLedger {
    pub fn new() -> Self {
        LotLedger::default()
    }

    /// Append a new lot, returning its id
    pub fn add_lot(
        &mut self,
        asset: &str,
        acquired_at: NaiveDateTime,
        source_trade_id: &str,
        amount: Decimal,
        unit_cost_basis: Decimal,
        total_cost_basis: Decimal,
    ) -> LotId {
        self.next_id += 1;
        let id = self.next_id;
        let lot = TaxLot {
            id,
            asset: asset.to_string(),
            acquired_at,
            source_trade_id: source_trade_id.to_string(),
            original_amount: amount,
            remaining_amount: amount,
            unit_cost_basis,
            total_cost_basis,
        };
        log::debug!(
            "Lot {} ADD: {} {} @ {} (trade {})",
            id,
            amount,
            asset,
            unit_cost_basis,
            source_trade_id
        );
        self.asset_of.insert(id, lot.asset.clone());
        self.lots.entry(lot.asset.clone()).or_default().push(lot);
        id
    }

    /// Open lots for an asset, acquisition-time ascending
    pub fn open_lots(&self, asset: &str) -> Vec<&TaxLot> {
        self.lots
            .get(asset)
            .map(|lots| lots.iter().filter(|l| l.is_open()).collect())
            .unwrap_or_default()
    }

    /// All lots for an asset, open and closed, acquisition-time ascending
    pub fn lots_for(&self, asset: &str) -> &[TaxLot] {
        self.lots.get(asset).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn lot(&self, id: LotId) -> Option<&TaxLot> {
        let asset = self.asset_of.get(&id)?;
        self.lots.get(asset)?.iter().find(|l| l.id == id)
    }

    /// Assets with at least one lot, sorted for deterministic iteration
    pub fn assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.lots.keys().map(String::as_str).collect();
        assets.sort_unstable();
        assets
    }

    /// Total open amount for an asset
    #[cfg(test)]
    pub fn open_total(&self, asset: &str) -> Decimal {
        self.open_lots(asset).iter().map(|l| l.remaining_amount).sum()
    }

    /// Decrement a lot's remaining amount. Within epsilon of zero the lot
    /// is clamped closed and excluded from future matching.
    pub fn consume(&mut self, lot_id: LotId, amount: Decimal) -> Result<(), InsufficientLotError> {
        let asset = self
            .asset_of
            .get(&lot_id)
            .ok_or(InsufficientLotError::UnknownLot(lot_id))?;
        let lot = self
            .lots
            .get_mut(asset)
            .and_then(|lots| lots.iter_mut().find(|l| l.id == lot_id))
            .ok_or(InsufficientLotError::UnknownLot(lot_id))?;

        if amount > lot.remaining_amount + AMOUNT_EPSILON {
            return Err(InsufficientLotError::LotOverdrawn {
                lot_id,
                asset: lot.asset.clone(),
                requested: amount,
                remaining: lot.remaining_amount,
            });
        }

        lot.remaining_amount -= amount;
        if lot.remaining_amount <= AMOUNT_EPSILON {
            lot.remaining_amount = Decimal::ZERO;
            log::debug!("Lot {} CONSUME {}: fully disposed", lot_id, amount);
        } else {
            log::debug!(
                "Lot {} CONSUME {}: {} remaining",
                lot_id,
                amount,
                lot.remaining_amount
            );
        }
        Ok(())
    }
}
