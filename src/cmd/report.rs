//! Report command - full financial-year report in CSV, JSON or text

use crate::cmd::{resolve_period, EngineArgs};
use crate::store::DisposalStore;
use crate::tax::aggregate::aggregate;
use crate::tax::report::{write_report, ReportFormat};
use clap::{Args, ValueEnum};
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ReportCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Financial year to report (e.g. 2024-2025, or just 2024)
    #[arg(short, long)]
    year: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
    format: FormatArg,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
    #[default]
    Text,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Json => ReportFormat::Json,
            FormatArg::Text => ReportFormat::Text,
        }
    }
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (config, report, store) = self.engine.run()?;
        let period = resolve_period(self.year.as_deref(), &report)?;
        let summary = aggregate(&store.list_disposals(period), period, &config);

        match &self.output {
            Some(path) => {
                let file = File::create(path)?;
                write_report(&summary, self.format.into(), &config.base_currency, file)?;
                log::info!("report written to {}", path.display());
            }
            None => {
                write_report(
                    &summary,
                    self.format.into(),
                    &config.base_currency,
                    io::stdout().lock(),
                )?;
            }
        }
        Ok(())
    }
}
