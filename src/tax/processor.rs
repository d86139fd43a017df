//! The disposal processor: turns a trade stream into lots and disposal
//! records.
//!
//! Each trade runs through a small per-trade machine (classify, then
//! create a lot or match-and-record) against a ledger that is rebuilt
//! from scratch every run. Failures are collected per trade; one bad trade
//! never aborts the rest of the stream.

use crate::config::TaxConfig;
use crate::rates::{RateLookup, RateLookupError};
use crate::store::{DisposalStore, LotStore};
use crate::tax::ledger::{InsufficientLotError, LotId, LotLedger, AMOUNT_EPSILON};
use crate::tax::matching::{LotSelections, MatchingMethod, UnsupportedMatchingPolicyError};
use crate::tax::rules::{self, FinancialYear};
use crate::trade::{MalformedTradeError, TradeKind, TradeRecord, TradeRecordRaw};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Malformed(#[from] MalformedTradeError),
    #[error(transparent)]
    InsufficientLot(#[from] InsufficientLotError),
    #[error(transparent)]
    UnsupportedMatchingPolicy(#[from] UnsupportedMatchingPolicyError),
    #[error(transparent)]
    RateLookup(#[from] RateLookupError),
}

impl ProcessError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::Malformed(_) => "malformed-trade",
            ProcessError::InsufficientLot(_) => "insufficient-lot",
            ProcessError::UnsupportedMatchingPolicy(_) => "unsupported-matching-policy",
            ProcessError::RateLookup(_) => "rate-lookup",
        }
    }
}

/// Realized disposal of part of one lot. Created exactly once per
/// (disposal event, lot) pairing and immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct DisposalRecord {
    pub id: u64,
    pub source_trade_id: String,
    pub lot_id: LotId,
    pub disposed_at: NaiveDateTime,
    pub asset: String,
    pub amount: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub gain: Decimal,
    pub holding_period_days: i64,
    pub qualifies_for_discount: bool,
    pub is_personal_use: bool,
    pub period_key: FinancialYear,
}

/// What a trade did to the ledger and disposal log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeEffects {
    pub lots_created: usize,
    pub disposals_recorded: usize,
    /// Specific-ID matching fell back to FIFO for some of the amount
    pub fifo_fallback: bool,
}

/// Per-trade result. A failed trade keeps whatever effects were applied
/// before the failure; a shortfall still records its partial disposals.
#[derive(Debug, PartialEq)]
pub enum TradeStatus {
    Applied(TradeEffects),
    Failed {
        error: ProcessError,
        effects: TradeEffects,
    },
}

#[derive(Debug, PartialEq)]
pub struct TradeOutcome {
    pub trade_id: String,
    pub status: TradeStatus,
}

impl TradeOutcome {
    pub fn error(&self) -> Option<&ProcessError> {
        match &self.status {
            TradeStatus::Failed { error, .. } => Some(error),
            TradeStatus::Applied(_) => None,
        }
    }

    pub fn effects(&self) -> &TradeEffects {
        match &self.status {
            TradeStatus::Applied(effects) => effects,
            TradeStatus::Failed { effects, .. } => effects,
        }
    }
}

/// Everything a processing run produced
#[derive(Debug)]
pub struct ProcessReport {
    pub outcomes: Vec<TradeOutcome>,
    pub disposals: Vec<DisposalRecord>,
    pub ledger: LotLedger,
}

impl ProcessReport {
    pub fn failures(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.outcomes.iter().filter(|o| o.error().is_some())
    }

    pub fn fallbacks(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.outcomes.iter().filter(|o| o.effects().fifo_fallback)
    }

    /// Periods with at least one disposal, ascending
    pub fn periods(&self) -> Vec<FinancialYear> {
        let mut periods: Vec<FinancialYear> = self.disposals.iter().map(|d| d.period_key).collect();
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

/// Drives the ledger and matching strategy over a trade stream.
pub struct DisposalProcessor<'a> {
    config: &'a TaxConfig,
    method: MatchingMethod,
    selections: Option<&'a LotSelections>,
    rates: Option<&'a dyn RateLookup>,
}

impl<'a> DisposalProcessor<'a> {
    pub fn new(config: &'a TaxConfig, method: MatchingMethod) -> Self {
        DisposalProcessor {
            config,
            method,
            selections: None,
            rates: None,
        }
    }

    pub fn with_selections(mut self, selections: &'a LotSelections) -> Self {
        self.selections = Some(selections);
        self
    }

    pub fn with_rates(mut self, rates: &'a dyn RateLookup) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Validate, sort and process a raw trade stream against a fresh
    /// ledger, mirroring lots and disposals into `store`.
    pub fn process<S>(&self, raws: Vec<TradeRecordRaw>, store: &mut S) -> ProcessReport
    where
        S: LotStore + DisposalStore,
    {
        let mut outcomes = Vec::with_capacity(raws.len());
        let mut trades = Vec::with_capacity(raws.len());

        for raw in raws {
            let raw_id = raw.id.clone();
            match TradeRecord::try_from(raw) {
                Ok(trade) => trades.push(trade),
                Err(error) => {
                    log::warn!("rejecting trade '{}': {}", raw_id, error);
                    outcomes.push(TradeOutcome {
                        trade_id: raw_id,
                        status: TradeStatus::Failed {
                            error: error.into(),
                            effects: TradeEffects::default(),
                        },
                    });
                }
            }
        }

        // Stable sort keeps same-timestamp trades in input order
        trades.sort_by_key(|t| t.timestamp);

        let mut ledger = LotLedger::new();
        let mut disposals = Vec::new();
        let mut next_disposal_id = 0u64;

        for trade in &trades {
            let status = match trade.kind {
                TradeKind::Acquisition | TradeKind::TransferIn => {
                    self.acquire(trade, &mut ledger, store)
                }
                TradeKind::Disposal | TradeKind::TransferOut => {
                    self.dispose(trade, &mut ledger, store, &mut disposals, &mut next_disposal_id)
                }
                TradeKind::Swap => {
                    self.swap(trade, &mut ledger, store, &mut disposals, &mut next_disposal_id)
                }
            };
            if let TradeStatus::Failed { error, .. } = &status {
                log::warn!("trade '{}' failed: {}", trade.id, error);
            }
            outcomes.push(TradeOutcome {
                trade_id: trade.id.clone(),
                status,
            });
        }

        ProcessReport {
            outcomes,
            disposals,
            ledger,
        }
    }

    fn acquire<S: LotStore>(
        &self,
        trade: &TradeRecord,
        ledger: &mut LotLedger,
        store: &mut S,
    ) -> TradeStatus {
        let mut effects = TradeEffects::default();
        if self.config.is_base_currency(&trade.base_asset) {
            log::debug!("trade '{}' acquires base currency, no lot", trade.id);
            return TradeStatus::Applied(effects);
        }

        let value = match self.valuation(trade) {
            Ok(value) => value,
            Err(error) => return TradeStatus::Failed { error, effects },
        };
        let fee = match self.fee_in_base(trade) {
            Ok(fee) => fee,
            Err(error) => return TradeStatus::Failed { error, effects },
        };
        let total_cost = match value {
            Some(value) => value + fee,
            None => {
                log::warn!(
                    "trade '{}' acquires {} without valuation, zero cost basis",
                    trade.id,
                    trade.base_asset
                );
                fee
            }
        };

        self.create_lot(trade, trade.base_amount, total_cost, ledger, store);
        effects.lots_created += 1;
        TradeStatus::Applied(effects)
    }

    fn dispose<S: LotStore + DisposalStore>(
        &self,
        trade: &TradeRecord,
        ledger: &mut LotLedger,
        store: &mut S,
        disposals: &mut Vec<DisposalRecord>,
        next_disposal_id: &mut u64,
    ) -> TradeStatus {
        let mut effects = TradeEffects::default();
        if self.config.is_base_currency(&trade.base_asset) {
            log::debug!("trade '{}' disposes base currency, nothing to match", trade.id);
            return TradeStatus::Applied(effects);
        }

        let proceeds = match self.valuation(trade) {
            Ok(Some(value)) => value,
            Ok(None) => {
                // Only transfers out get here; an unvalued Disposal is
                // rejected as malformed before processing.
                log::warn!(
                    "trade '{}' transfers out {} without valuation, zero proceeds",
                    trade.id,
                    trade.base_asset
                );
                Decimal::ZERO
            }
            Err(error) => return TradeStatus::Failed { error, effects },
        };

        match self.match_and_record(
            trade,
            proceeds,
            ledger,
            store,
            disposals,
            next_disposal_id,
            &mut effects,
        ) {
            Ok(()) => TradeStatus::Applied(effects),
            Err(error) => TradeStatus::Failed { error, effects },
        }
    }

    /// A swap disposes of the base asset and acquires the quote asset.
    /// The acquired lot's cost basis equals the disposal proceeds, the
    /// same outcome a sell-then-buy pair at that valuation would produce.
    fn swap<S: LotStore + DisposalStore>(
        &self,
        trade: &TradeRecord,
        ledger: &mut LotLedger,
        store: &mut S,
        disposals: &mut Vec<DisposalRecord>,
        next_disposal_id: &mut u64,
    ) -> TradeStatus {
        let mut effects = TradeEffects::default();
        let (Some(quote_asset), Some(quote_amount)) =
            (trade.quote_asset.as_deref(), trade.quote_amount.filter(|q| *q > Decimal::ZERO))
        else {
            return TradeStatus::Failed {
                error: MalformedTradeError::IncompleteSwap { id: trade.id.clone() }.into(),
                effects,
            };
        };

        let disposes_lot = !self.config.is_base_currency(&trade.base_asset);
        let value = if disposes_lot {
            match self.valuation(trade) {
                Ok(Some(value)) => value,
                Ok(None) => Decimal::ZERO,
                Err(error) => return TradeStatus::Failed { error, effects },
            }
        } else {
            // Swapping out of the base currency is a plain purchase; the
            // cost is what was spent.
            trade.base_amount
        };

        let mut disposal_error = None;
        if disposes_lot {
            if let Err(error) = self.match_and_record(
                trade,
                value,
                ledger,
                store,
                disposals,
                next_disposal_id,
                &mut effects,
            ) {
                match error {
                    // The quote asset was still received; credit it below
                    // and report the shortfall afterwards.
                    ProcessError::InsufficientLot(_) => disposal_error = Some(error),
                    other => return TradeStatus::Failed { error: other, effects },
                }
            }
        }

        if !self.config.is_base_currency(quote_asset) {
            let lot_id = ledger.add_lot(
                quote_asset,
                trade.timestamp,
                &trade.id,
                quote_amount,
                value / quote_amount,
                value,
            );
            store.append_lot(ledger.lot(lot_id).expect("lot just added").clone());
            effects.lots_created += 1;
        }

        match disposal_error {
            Some(error) => TradeStatus::Failed { error, effects },
            None => TradeStatus::Applied(effects),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn match_and_record<S: LotStore + DisposalStore>(
        &self,
        trade: &TradeRecord,
        proceeds: Decimal,
        ledger: &mut LotLedger,
        store: &mut S,
        disposals: &mut Vec<DisposalRecord>,
        next_disposal_id: &mut u64,
        effects: &mut TradeEffects,
    ) -> Result<(), ProcessError> {
        let selection = self.selections.and_then(|s| s.for_trade(&trade.id));
        let (plan, portions) = {
            let open = ledger.open_lots(&trade.base_asset);
            let plan = self.method.plan(&trade.id, &open, trade.base_amount, selection)?;
            let portions: Vec<(LotId, Decimal, NaiveDateTime, Decimal)> = plan
                .portions
                .iter()
                .map(|p| {
                    let lot = open
                        .iter()
                        .find(|l| l.id == p.lot_id)
                        .expect("planned lot is open");
                    (p.lot_id, p.amount, lot.acquired_at, lot.unit_cost_basis)
                })
                .collect();
            (plan, portions)
        };

        if plan.fifo_fallback {
            log::warn!(
                "trade '{}': no specific-id selection for the full amount, falling back to FIFO",
                trade.id
            );
            effects.fifo_fallback = true;
        }

        let fee = self.fee_in_base(trade)?;
        let period_key = FinancialYear::from_date(trade.timestamp.date(), self.config.fy_start_month);

        for (lot_id, amount, acquired_at, unit_cost_basis) in portions {
            let fraction = amount / trade.base_amount;
            let cost_basis = amount * unit_cost_basis + fee * fraction;
            let proceeds_portion = proceeds * fraction;
            let holding_period_days = (trade.timestamp - acquired_at).num_days();

            ledger.consume(lot_id, amount)?;
            let remaining = ledger
                .lot(lot_id)
                .expect("consumed lot exists")
                .remaining_amount;
            store.update_lot(lot_id, remaining);

            *next_disposal_id += 1;
            let record = DisposalRecord {
                id: *next_disposal_id,
                source_trade_id: trade.id.clone(),
                lot_id,
                disposed_at: trade.timestamp,
                asset: trade.base_asset.clone(),
                amount,
                proceeds: proceeds_portion,
                cost_basis,
                gain: proceeds_portion - cost_basis,
                holding_period_days,
                qualifies_for_discount: rules::qualifies_for_discount(holding_period_days, self.config),
                is_personal_use: rules::is_personal_use(proceeds_portion, self.config),
                period_key,
            };
            store.append_disposal(record.clone());
            disposals.push(record);
            effects.disposals_recorded += 1;
        }

        if plan.matched + AMOUNT_EPSILON < trade.base_amount {
            return Err(InsufficientLotError::Shortfall {
                asset: trade.base_asset.clone(),
                requested: trade.base_amount,
                matched: plan.matched,
                shortfall: trade.base_amount - plan.matched,
            }
            .into());
        }
        Ok(())
    }

    fn create_lot<S: LotStore>(
        &self,
        trade: &TradeRecord,
        amount: Decimal,
        total_cost: Decimal,
        ledger: &mut LotLedger,
        store: &mut S,
    ) {
        let lot_id = ledger.add_lot(
            &trade.base_asset,
            trade.timestamp,
            &trade.id,
            amount,
            total_cost / amount,
            total_cost,
        );
        store.append_lot(ledger.lot(lot_id).expect("lot just added").clone());
    }

    /// Value the trade's quote side in the base currency. `None` means the
    /// trade carries no valuation at all.
    fn valuation(&self, trade: &TradeRecord) -> Result<Option<Decimal>, ProcessError> {
        let in_quote = trade
            .quote_amount
            .or_else(|| trade.unit_price.map(|p| p * trade.base_amount));
        match trade.quote_asset.as_deref() {
            Some(quote) if self.config.is_base_currency(quote) => Ok(in_quote),
            Some(quote) => match in_quote {
                Some(value) => {
                    let rate = self.rate(quote, trade.timestamp)?;
                    Ok(Some(value * rate))
                }
                None => Ok(None),
            },
            // No quote asset: a unit price is read as base currency
            None => Ok(in_quote),
        }
    }

    fn fee_in_base(&self, trade: &TradeRecord) -> Result<Decimal, ProcessError> {
        if trade.fee_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        match trade.fee_asset.as_deref() {
            None => Ok(trade.fee_amount),
            Some(asset) if self.config.is_base_currency(asset) => Ok(trade.fee_amount),
            Some(asset) => Ok(trade.fee_amount * self.rate(asset, trade.timestamp)?),
        }
    }

    fn rate(&self, asset: &str, at: NaiveDateTime) -> Result<Decimal, ProcessError> {
        match self.rates {
            Some(rates) => Ok(rates.rate_to_base(asset, at)?),
            None => Err(RateLookupError::NoSource {
                asset: asset.to_string(),
                at,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::RateTable;
    use crate::store::MemoryStore;
    use crate::tax::aggregate::aggregate;
    use rust_decimal_macros::dec;

    fn raw(id: &str, kind: &str, ts: &str, asset: &str, amount: Decimal) -> TradeRecordRaw {
        TradeRecordRaw {
            id: id.to_string(),
            source: None,
            source_id: None,
            kind: kind.to_string(),
            timestamp: ts.to_string(),
            base_asset: asset.to_string(),
            quote_asset: Some("AUD".to_string()),
            base_amount: amount,
            quote_amount: None,
            unit_price: None,
            fee_amount: None,
            fee_asset: None,
            wallet_ref: None,
            notes: None,
        }
    }

    fn buy(id: &str, ts: &str, asset: &str, amount: Decimal, cost: Decimal) -> TradeRecordRaw {
        let mut t = raw(id, "buy", ts, asset, amount);
        t.quote_amount = Some(cost);
        t
    }

    fn sell(id: &str, ts: &str, asset: &str, amount: Decimal, proceeds: Decimal) -> TradeRecordRaw {
        let mut t = raw(id, "sell", ts, asset, amount);
        t.quote_amount = Some(proceeds);
        t
    }

    fn run(trades: Vec<TradeRecordRaw>, method: MatchingMethod) -> (ProcessReport, MemoryStore) {
        let config = TaxConfig::default();
        let mut store = MemoryStore::new();
        let report = DisposalProcessor::new(&config, method).process(trades, &mut store);
        (report, store)
    }

    #[test]
    fn acquisition_creates_lot_with_cost_basis() {
        let (report, store) = run(
            vec![buy("t-1", "2024-01-15", "BTC", dec!(0.5), dec!(30000))],
            MatchingMethod::Fifo,
        );

        assert!(report.failures().next().is_none());
        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].original_amount, dec!(0.5));
        assert_eq!(lots[0].unit_cost_basis, dec!(60000));
        assert_eq!(lots[0].total_cost_basis, dec!(30000));
        assert_eq!(store.lots().len(), 1);
    }

    #[test]
    fn unit_price_used_when_quote_is_base_currency() {
        let mut t = raw("t-1", "buy", "2024-01-15", "BTC", dec!(2));
        t.unit_price = Some(dec!(50000));
        let (report, _) = run(vec![t], MatchingMethod::Fifo);

        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].unit_cost_basis, dec!(50000));
        assert_eq!(lots[0].total_cost_basis, dec!(100000));
    }

    #[test]
    fn acquisition_fee_increases_cost_basis() {
        let mut t = buy("t-1", "2024-01-15", "BTC", dec!(1), dec!(50000));
        t.fee_amount = Some(dec!(100));
        t.fee_asset = Some("AUD".to_string());
        let (report, _) = run(vec![t], MatchingMethod::Fifo);

        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].total_cost_basis, dec!(50100));
    }

    #[test]
    fn disposal_realizes_gain_per_lot() {
        let (report, _) = run(
            vec![
                buy("t-1", "2023-01-01", "BTC", dec!(1), dec!(40000)),
                sell("t-2", "2024-03-01", "BTC", dec!(1), dec!(65000)),
            ],
            MatchingMethod::Fifo,
        );

        assert_eq!(report.disposals.len(), 1);
        let d = &report.disposals[0];
        assert_eq!(d.proceeds, dec!(65000));
        assert_eq!(d.cost_basis, dec!(40000));
        assert_eq!(d.gain, dec!(25000));
        assert_eq!(d.holding_period_days, 425);
        assert!(d.qualifies_for_discount);
        assert!(!d.is_personal_use);
        assert_eq!(d.period_key, FinancialYear(2023));
    }

    #[test]
    fn fifo_partial_consumption_across_lots() {
        // Lots [2, 3, 5]; disposing 4 takes 2 from the first and 2 from
        // the second, leaving the second with 1 and the third untouched.
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(2), dec!(20000)),
                buy("t-2", "2024-02-01", "BTC", dec!(3), dec!(30000)),
                buy("t-3", "2024-03-01", "BTC", dec!(5), dec!(50000)),
                sell("t-4", "2024-04-01", "BTC", dec!(4), dec!(48000)),
            ],
            MatchingMethod::Fifo,
        );

        assert_eq!(report.disposals.len(), 2);
        assert_eq!(report.disposals[0].amount, dec!(2));
        assert_eq!(report.disposals[1].amount, dec!(2));

        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].remaining_amount, Decimal::ZERO);
        assert_eq!(lots[1].remaining_amount, dec!(1));
        assert_eq!(lots[2].remaining_amount, dec!(5));
    }

    #[test]
    fn lifo_consumes_newest_lot() {
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(2), dec!(20000)),
                buy("t-2", "2024-02-01", "BTC", dec!(3), dec!(30000)),
                buy("t-3", "2024-03-01", "BTC", dec!(5), dec!(50000)),
                sell("t-4", "2024-04-01", "BTC", dec!(4), dec!(48000)),
            ],
            MatchingMethod::Lifo,
        );

        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].amount, dec!(4));

        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].remaining_amount, dec!(2));
        assert_eq!(lots[1].remaining_amount, dec!(3));
        assert_eq!(lots[2].remaining_amount, dec!(1));
    }

    #[test]
    fn proceeds_and_fees_prorated_across_lots() {
        let mut disposal = sell("t-3", "2024-04-01", "BTC", dec!(4), dec!(48000));
        disposal.fee_amount = Some(dec!(40));
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(10000)),
                buy("t-2", "2024-02-01", "BTC", dec!(3), dec!(36000)),
                disposal,
            ],
            MatchingMethod::Fifo,
        );

        assert_eq!(report.disposals.len(), 2);
        let first = &report.disposals[0];
        let second = &report.disposals[1];
        // proceeds split 1:3
        assert_eq!(first.proceeds, dec!(12000));
        assert_eq!(second.proceeds, dec!(36000));
        // fee split the same way, into cost basis
        assert_eq!(first.cost_basis, dec!(10000) + dec!(10));
        assert_eq!(second.cost_basis, dec!(36000) + dec!(30));
    }

    #[test]
    fn shortfall_reported_with_partial_disposals_kept() {
        // 6 open, dispose 10: the 6 still get recorded, shortfall is 4
        let (report, store) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(6), dec!(60000)),
                sell("t-2", "2024-02-01", "BTC", dec!(10), dec!(120000)),
            ],
            MatchingMethod::Fifo,
        );

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].trade_id, "t-2");
        let error = failed[0].error().unwrap();
        assert!(matches!(error, ProcessError::InsufficientLot(_)));
        if let ProcessError::InsufficientLot(e) = error {
            assert_eq!(e.shortfall(), Some(dec!(4)));
        }

        assert_eq!(failed[0].effects().disposals_recorded, 1);
        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].amount, dec!(6));
        // proceeds prorated to the matched portion only
        assert_eq!(report.disposals[0].proceeds, dec!(72000));
        assert_eq!(store.disposals().len(), 1);
        assert_eq!(report.ledger.open_total("BTC"), Decimal::ZERO);
    }

    #[test]
    fn malformed_trade_does_not_abort_stream() {
        let mut bad = buy("t-2", "2024-01-02", "BTC", dec!(1), dec!(1000));
        bad.base_amount = dec!(-1);
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(40000)),
                bad,
                sell("t-3", "2024-02-01", "BTC", dec!(1), dec!(50000)),
            ],
            MatchingMethod::Fifo,
        );

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].gain, dec!(10000));
    }

    #[test]
    fn trades_sorted_before_processing() {
        // Disposal arrives first in the stream but later in time
        let (report, _) = run(
            vec![
                sell("t-2", "2024-06-01", "BTC", dec!(1), dec!(50000)),
                buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(40000)),
            ],
            MatchingMethod::Fifo,
        );

        assert!(report.failures().next().is_none());
        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].gain, dec!(10000));
    }

    #[test]
    fn swap_disposes_base_and_credits_quote() {
        let mut swap = raw("t-2", "swap", "2024-05-01", "BTC", dec!(1));
        swap.quote_asset = Some("ETH".to_string());
        swap.quote_amount = Some(dec!(20));

        let mut rates = RateTable::new();
        rates.insert(
            "ETH",
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            dec!(5000),
        );

        let config = TaxConfig::default();
        let mut store = MemoryStore::new();
        let report = DisposalProcessor::new(&config, MatchingMethod::Fifo)
            .with_rates(&rates)
            .process(
                vec![buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(60000)), swap],
                &mut store,
            );

        assert!(report.failures().next().is_none());
        // disposal of BTC at the swap's valuation: 20 ETH * 5000
        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].asset, "BTC");
        assert_eq!(report.disposals[0].proceeds, dec!(100000));
        assert_eq!(report.disposals[0].gain, dec!(40000));

        // acquired ETH lot carries the same value as cost basis
        let eth_lots = report.ledger.lots_for("ETH");
        assert_eq!(eth_lots.len(), 1);
        assert_eq!(eth_lots[0].original_amount, dec!(20));
        assert_eq!(eth_lots[0].total_cost_basis, dec!(100000));
        assert_eq!(eth_lots[0].unit_cost_basis, dec!(5000));
    }

    #[test]
    fn swap_into_base_currency_is_a_sale() {
        let mut swap = raw("t-2", "swap", "2024-05-01", "BTC", dec!(1));
        swap.quote_asset = Some("AUD".to_string());
        swap.quote_amount = Some(dec!(70000));

        let (report, _) = run(
            vec![buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(60000)), swap],
            MatchingMethod::Fifo,
        );

        assert!(report.failures().next().is_none());
        assert_eq!(report.disposals.len(), 1);
        assert_eq!(report.disposals[0].gain, dec!(10000));
        // no AUD lot created
        assert!(report.ledger.lots_for("AUD").is_empty());
    }

    #[test]
    fn non_base_quote_without_rates_fails_per_trade() {
        let mut t = raw("t-1", "buy", "2024-01-15", "BTC", dec!(1));
        t.quote_asset = Some("USDT".to_string());
        t.quote_amount = Some(dec!(65000));

        let (report, _) = run(
            vec![t, buy("t-2", "2024-01-16", "ETH", dec!(1), dec!(5000))],
            MatchingMethod::Fifo,
        );

        let failed: Vec<_> = report.failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].trade_id, "t-1");
        assert!(matches!(failed[0].error(), Some(ProcessError::RateLookup(_))));
        // the other trade still applied
        assert_eq!(report.ledger.lots_for("ETH").len(), 1);
    }

    #[test]
    fn non_base_quote_valued_through_rate_table() {
        let mut t = raw("t-1", "buy", "2024-01-15", "BTC", dec!(1));
        t.quote_asset = Some("USDT".to_string());
        t.quote_amount = Some(dec!(40000));

        let mut rates = RateTable::new();
        rates.insert(
            "USDT",
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            dec!(1.5),
        );

        let config = TaxConfig::default();
        let mut store = MemoryStore::new();
        let report = DisposalProcessor::new(&config, MatchingMethod::Fifo)
            .with_rates(&rates)
            .process(vec![t], &mut store);

        assert!(report.failures().next().is_none());
        assert_eq!(report.ledger.lots_for("BTC")[0].total_cost_basis, dec!(60000));
    }

    #[test]
    fn unvalued_transfer_in_creates_zero_cost_lot() {
        let mut t = raw("t-1", "transfer_in", "2024-01-15", "BTC", dec!(1));
        t.quote_asset = None;
        t.quote_amount = None;
        let (report, _) = run(vec![t], MatchingMethod::Fifo);

        assert!(report.failures().next().is_none());
        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].total_cost_basis, Decimal::ZERO);
    }

    #[test]
    fn specific_id_fallback_recorded_on_outcome() {
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(2), dec!(20000)),
                sell("t-2", "2024-02-01", "BTC", dec!(1), dec!(15000)),
            ],
            MatchingMethod::SpecificId,
        );

        assert!(report.failures().next().is_none());
        let fallbacks: Vec<_> = report.fallbacks().collect();
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].trade_id, "t-2");
    }

    #[test]
    fn specific_id_selection_consumes_named_lot() {
        let mut selections = LotSelections::default();
        selections.0.insert(
            "t-3".to_string(),
            vec![crate::tax::matching::SelectionEntry {
                lot: "t-2".to_string(),
                amount: dec!(1),
            }],
        );

        let config = TaxConfig::default();
        let mut store = MemoryStore::new();
        let report = DisposalProcessor::new(&config, MatchingMethod::SpecificId)
            .with_selections(&selections)
            .process(
                vec![
                    buy("t-1", "2024-01-01", "BTC", dec!(1), dec!(10000)),
                    buy("t-2", "2024-02-01", "BTC", dec!(1), dec!(30000)),
                    sell("t-3", "2024-03-01", "BTC", dec!(1), dec!(35000)),
                ],
                &mut store,
            );

        assert!(report.failures().next().is_none());
        assert!(report.fallbacks().next().is_none());
        assert_eq!(report.disposals.len(), 1);
        // gain against the named (higher-cost) lot
        assert_eq!(report.disposals[0].cost_basis, dec!(30000));
        assert_eq!(report.disposals[0].gain, dec!(5000));

        let lots = report.ledger.lots_for("BTC");
        assert_eq!(lots[0].remaining_amount, dec!(1));
        assert_eq!(lots[1].remaining_amount, Decimal::ZERO);
    }

    #[test]
    fn conservation_of_amounts() {
        let (report, _) = run(
            vec![
                buy("t-1", "2024-01-01", "BTC", dec!(2), dec!(20000)),
                buy("t-2", "2024-02-01", "BTC", dec!(3), dec!(30000)),
                sell("t-3", "2024-03-01", "BTC", dec!(1.5), dec!(18000)),
                sell("t-4", "2024-04-01", "BTC", dec!(2.25), dec!(27000)),
            ],
            MatchingMethod::Fifo,
        );

        let original: Decimal = report.ledger.lots_for("BTC").iter().map(|l| l.original_amount).sum();
        let remaining = report.ledger.open_total("BTC");
        let disposed: Decimal = report.disposals.iter().map(|d| d.amount).sum();
        assert!(((remaining + disposed) - original).abs() <= AMOUNT_EPSILON);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let trades = vec![
            buy("t-1", "2023-01-01", "BTC", dec!(1), dec!(40000)),
            sell("t-2", "2024-08-01", "BTC", dec!(1), dec!(65000)),
        ];
        let config = TaxConfig::default();

        let mut first_store = MemoryStore::new();
        let first = DisposalProcessor::new(&config, MatchingMethod::Fifo)
            .process(trades.clone(), &mut first_store);
        let mut second_store = MemoryStore::new();
        let second = DisposalProcessor::new(&config, MatchingMethod::Fifo)
            .process(trades, &mut second_store);

        assert_eq!(first.disposals, second.disposals);
        assert_eq!(first_store.lots(), second_store.lots());

        let period = FinancialYear(2024);
        let a = aggregate(first_store.disposals(), period, &config);
        let b = aggregate(second_store.disposals(), period, &config);
        assert_eq!(a, b);
        assert_eq!(a.disposals.len(), 1);
    }
}
