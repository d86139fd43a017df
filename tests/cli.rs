//! E2E tests for the report, summary, lots, validate and schema commands

use std::process::Command;

/// Text summary over a CSV trade log
#[test]
fn summary_text_output() {
    let output = Command::new("cargo")
        .args(["run", "--", "summary", "-t", "tests/data/trades.csv"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    // FY 2024-2025: 1 BTC discounted gain of 40000 + 0.5 BTC gain of 10000
    assert!(stdout.contains("TAX SUMMARY (2024-2025)"));
    assert!(stdout.contains("Disposals: 2"));
    assert!(stdout.contains("Net Gain"));
}

/// Summary command with JSON output
#[test]
fn summary_json_output() {
    let output = Command::new("cargo")
        .args(["run", "--", "summary", "-t", "tests/data/trades.csv", "--json"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("\"financial_year\": \"2024-2025\""));
    assert!(stdout.contains("\"disposal_count\": 2"));
    assert!(stdout.contains("\"discount_amount\": \"20000.00\""));
    assert!(stdout.contains("\"net_gain\": \"30000.00\""));
}

/// CSV report has header, rows and trailing summary
#[test]
fn report_csv_output() {
    let output = Command::new("cargo")
        .args([
            "run",
            "--",
            "report",
            "-t",
            "tests/data/trades.csv",
            "--format",
            "csv",
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("Date,Asset,Amount,Proceeds (AUD)"));
    assert!(stdout.contains("2024-08-15,BTC,1"));
    assert!(stdout.contains("Total Gains,30000"));
    assert!(stdout.contains("Discount Amount,20000"));
}

/// JSON trade log input works end to end
#[test]
fn json_input_format() {
    let output = Command::new("cargo")
        .args([
            "run",
            "--",
            "report",
            "-t",
            "tests/data/trades.json",
            "--format",
            "json",
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("\"period_key\": \"2024-2025\""));
    assert!(stdout.contains("\"asset\": \"BTC\""));
}

/// LIFO changes which lot a disposal consumes
#[test]
fn lots_table_lifo() {
    let output = Command::new("cargo")
        .args([
            "run",
            "--",
            "lots",
            "-t",
            "tests/data/trades.csv",
            "--method",
            "lifo",
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);

    // Under LIFO the 2024 lot is consumed first; the 2023 lot keeps 0.5
    assert!(stdout.contains("BTC"));
    assert!(stdout.contains("t-1"));
    assert!(stdout.contains("t-2"));
}

/// Validate exits non-zero and names the issues
#[test]
fn validate_reports_issues() {
    let output = Command::new("cargo")
        .args(["run", "--", "validate", "-t", "tests/data/bad_trades.csv"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(!output.status.success(), "Expected non-zero exit: {:?}", output);

    // over-disposal shortfall and an unknown trade kind
    assert!(stdout.contains("insufficient-lot"));
    assert!(stdout.contains("malformed-trade"));
    assert!(stdout.contains("t-2"));
    assert!(stdout.contains("t-3"));
}

/// Schema command prints the CSV header
#[test]
fn schema_csv_header() {
    let output = Command::new("cargo")
        .args(["run", "--", "schema", "csv-header"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.starts_with("id,source,source_id,kind,timestamp,base_asset"));
}
