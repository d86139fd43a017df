//! Persistence collaborator interfaces.
//!
//! The engine produces lots and disposal records; where they end up is the
//! caller's business. These traits are the seam: the in-memory store below
//! is what the CLI uses, and a file- or database-backed implementation can
//! be substituted without touching engine logic. A computation run always
//! starts from a fresh store rebuilt from the full trade history, so
//! re-running a report never duplicates state.

use crate::tax::ledger::{LotId, TaxLot};
use crate::tax::processor::DisposalRecord;
use crate::tax::rules::FinancialYear;
use rust_decimal::Decimal;

pub trait LotStore {
    fn append_lot(&mut self, lot: TaxLot);
    fn list_open_lots(&self, asset: &str) -> Vec<TaxLot>;
    fn update_lot(&mut self, id: LotId, remaining_amount: Decimal);
}

pub trait DisposalStore {
    fn append_disposal(&mut self, record: DisposalRecord);
    fn list_disposals(&self, period: FinancialYear) -> Vec<DisposalRecord>;
}

/// In-memory store backing a single computation run
#[derive(Debug, Default)]
pub struct MemoryStore {
    lots: Vec<TaxLot>,
    disposals: Vec<DisposalRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn lots(&self) -> &[TaxLot] {
        &self.lots
    }

    pub fn disposals(&self) -> &[DisposalRecord] {
        &self.disposals
    }
}

impl LotStore for MemoryStore {
    fn append_lot(&mut self, lot: TaxLot) {
        self.lots.push(lot);
    }

    fn list_open_lots(&self, asset: &str) -> Vec<TaxLot> {
        self.lots
            .iter()
            .filter(|l| l.asset == asset && l.is_open())
            .cloned()
            .collect()
    }

    fn update_lot(&mut self, id: LotId, remaining_amount: Decimal) {
        if let Some(lot) = self.lots.iter_mut().find(|l| l.id == id) {
            lot.remaining_amount = remaining_amount;
        }
    }
}

impl DisposalStore for MemoryStore {
    fn append_disposal(&mut self, record: DisposalRecord) {
        self.disposals.push(record);
    }

    fn list_disposals(&self, period: FinancialYear) -> Vec<DisposalRecord> {
        self.disposals
            .iter()
            .filter(|d| d.period_key == period)
            .cloned()
            .collect()
    }
}
