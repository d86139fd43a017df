//! Validate command - surface data quality issues without generating full reports

use crate::cmd::EngineArgs;
use crate::tax::processor::ProcessReport;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    engine: EngineArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: String,
    trade_id: String,
    message: String,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput {
    trade_count: usize,
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let (_, report, _) = self.engine.run()?;
        let issues = collect_issues(&report);

        if self.json {
            let issue_count = issues.len();
            let output = ValidationOutput {
                trade_count: report.outcomes.len(),
                issue_count,
                issues,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if issue_count > 0 {
                std::process::exit(1);
            }
            return Ok(());
        }

        if issues.is_empty() {
            println!("No issues found in {} trades", report.outcomes.len());
            return Ok(());
        }

        println!();
        println!("VALIDATION ISSUES ({})", issues.len());
        println!();
        for issue in &issues {
            println!("  [{}] {}: {}", issue.issue_type, issue.trade_id, issue.message);
        }
        println!();
        std::process::exit(1);
    }
}

fn collect_issues(report: &ProcessReport) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for outcome in &report.outcomes {
        if let Some(error) = outcome.error() {
            issues.push(ValidationIssue {
                issue_type: error.kind().to_string(),
                trade_id: outcome.trade_id.clone(),
                message: error.to_string(),
            });
        }
        if outcome.effects().fifo_fallback {
            issues.push(ValidationIssue {
                issue_type: "fifo-fallback".to_string(),
                trade_id: outcome.trade_id.clone(),
                message: "specific-id matching fell back to FIFO".to_string(),
            });
        }
    }
    issues
}
