pub mod aggregate;
pub mod ledger;
pub mod matching;
pub mod processor;
pub mod report;
pub mod rules;

pub use aggregate::{aggregate, PeriodSummary};
pub use ledger::{InsufficientLotError, LotLedger, TaxLot};
pub use matching::{LotSelections, MatchingMethod};
pub use processor::{DisposalProcessor, DisposalRecord, ProcessReport};
pub use rules::FinancialYear;
