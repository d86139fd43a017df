use clap::{Parser, Subcommand};

mod cmd;
mod config;
mod rates;
mod store;
mod tax;
mod trade;

#[derive(Parser, Debug)]
#[command(
    name = "taxlog",
    version,
    about = "Capital gains tax lot accounting for asset trade logs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full financial-year report (CSV, JSON or text)
    Report(cmd::report::ReportCommand),
    /// Aggregated financial-year totals
    Summary(cmd::summary::SummaryCommand),
    /// Lot ledger state after processing the trade log
    Lots(cmd::lots::LotsCommand),
    /// Check a trade log for data quality issues
    Validate(cmd::validate::ValidateCommand),
    /// Print expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(cmd) => cmd.exec(),
        Command::Summary(cmd) => cmd.exec(),
        Command::Lots(cmd) => cmd.exec(),
        Command::Validate(cmd) => cmd.exec(),
        Command::Schema(cmd) => cmd.exec(),
    }
}
