//! Command implementations and shared input loading.

pub mod lots;
pub mod report;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::config::TaxConfig;
use crate::rates::RateTable;
use crate::store::MemoryStore;
use crate::tax::matching::LotSelections;
use crate::tax::processor::{DisposalProcessor, ProcessReport};
use crate::tax::rules::FinancialYear;
use crate::tax::MatchingMethod;
use crate::trade::{self, TradeRecordRaw};
use clap::ValueEnum;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Inputs shared by every engine-driving command
#[derive(clap::Args, Debug)]
pub struct EngineArgs {
    /// Trades file, CSV or JSON (or stdin with "-")
    #[arg(short, long)]
    pub trades: PathBuf,

    /// Lot matching method
    #[arg(short, long, value_enum, default_value_t = MethodArg::Fifo)]
    pub method: MethodArg,

    /// JSON config file overriding jurisdiction defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// CSV rate table for valuing non-base-currency amounts
    #[arg(short, long)]
    pub rates: Option<PathBuf>,

    /// JSON lot selections for specific-id matching
    #[arg(short, long)]
    pub selections: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum MethodArg {
    #[default]
    Fifo,
    Lifo,
    SpecificId,
}

impl From<MethodArg> for MatchingMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Fifo => MatchingMethod::Fifo,
            MethodArg::Lifo => MatchingMethod::Lifo,
            MethodArg::SpecificId => MatchingMethod::SpecificId,
        }
    }
}

impl EngineArgs {
    /// Load all inputs and run the processing pipeline over a fresh store
    pub fn run(&self) -> anyhow::Result<(TaxConfig, ProcessReport, MemoryStore)> {
        let config = load_config(self.config.as_deref())?;
        let rates = load_rates(self.rates.as_deref())?;
        let selections = load_selections(self.selections.as_deref())?;
        let trades = read_trades(&self.trades)?;

        let mut store = MemoryStore::new();
        let mut processor = DisposalProcessor::new(&config, self.method.into());
        if let Some(rates) = rates.as_ref() {
            processor = processor.with_rates(rates);
        }
        if let Some(selections) = selections.as_ref() {
            processor = processor.with_selections(selections);
        }
        let report = processor.process(trades, &mut store);

        let failed = report.failures().count();
        if failed > 0 {
            log::warn!("{} of {} trades failed", failed, report.outcomes.len());
        }
        Ok((config, report, store))
    }
}

/// Read raw trades from CSV or JSON (decided by extension), or stdin with "-"
pub fn read_trades(path: &Path) -> anyhow::Result<Vec<TradeRecordRaw>> {
    if path.as_os_str() == "-" {
        return read_from_stdin();
    }
    let file =
        File::open(path).map_err(|e| anyhow::anyhow!("cannot open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        trade::read_json(reader)
    } else {
        trade::read_csv(reader)
    }
}

fn read_from_stdin() -> anyhow::Result<Vec<TradeRecordRaw>> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    // JSON payloads start with an object, anything else is read as CSV
    if buffer.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
        trade::read_json(io::Cursor::new(buffer))
    } else {
        trade::read_csv(io::Cursor::new(buffer))
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<TaxConfig> {
    match path {
        Some(path) => TaxConfig::from_json_file(path),
        None => Ok(TaxConfig::default()),
    }
}

pub fn load_rates(path: Option<&Path>) -> anyhow::Result<Option<RateTable>> {
    match path {
        Some(path) => Ok(Some(RateTable::read_csv(File::open(path)?)?)),
        None => Ok(None),
    }
}

pub fn load_selections(path: Option<&Path>) -> anyhow::Result<Option<LotSelections>> {
    match path {
        Some(path) => {
            let selections = serde_json::from_reader(BufReader::new(File::open(path)?))?;
            Ok(Some(selections))
        }
        None => Ok(None),
    }
}

/// The requested financial year, or the latest one with disposals
pub fn resolve_period(
    year: Option<&str>,
    report: &ProcessReport,
) -> anyhow::Result<FinancialYear> {
    match year {
        Some(year) => year.parse::<FinancialYear>().map_err(|e| anyhow::anyhow!(e)),
        None => report
            .periods()
            .last()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no disposals found; specify --year")),
    }
}
