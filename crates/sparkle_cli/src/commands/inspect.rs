//! Inspect command implementation.

use serde::Serialize;
use sparkle_core::{Model, Table};
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// Total number of rows.
    pub rows: usize,
    /// Rows with desired state.
    pub desired: usize,
    /// Rows with current state.
    pub current: usize,
    /// Non-empty tables.
    pub tables: Vec<TableStats>,
    /// Index problems found by verification.
    pub inconsistencies: Vec<String>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: &'static str,
    /// Number of rows.
    pub rows: usize,
    /// Rows with desired state.
    pub desired: usize,
    /// Rows with current state.
    pub current: usize,
}

impl TableStats {
    fn of(table: &Table) -> Self {
        Self {
            name: table.name(),
            rows: table.len(),
            desired: table.rows().filter(|r| r.desired().is_some()).count(),
            current: table.rows().filter(|r| r.current().is_some()).count(),
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let model = super::load_model(path)?;
    let result = inspect(&model, path);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    if result.inconsistencies.is_empty() {
        Ok(())
    } else {
        Err(format!("{} index inconsistencies", result.inconsistencies.len()).into())
    }
}

/// Collects statistics of a loaded model.
pub fn inspect(model: &Model, path: &Path) -> InspectResult {
    let tables: Vec<TableStats> = model
        .tables()
        .filter(|t| !t.is_empty())
        .map(TableStats::of)
        .collect();

    InspectResult {
        path: path.display().to_string(),
        rows: tables.iter().map(|t| t.rows).sum(),
        desired: tables.iter().map(|t| t.desired).sum(),
        current: tables.iter().map(|t| t.current).sum(),
        tables,
        inconsistencies: model.verify().iter().map(ToString::to_string).collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Sparkle Snapshot Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Rows:");
    println!("  Total:   {}", result.rows);
    println!("  Desired: {}", result.desired);
    println!("  Current: {}", result.current);

    if !result.tables.is_empty() {
        println!();
        println!("Tables:");
        for table in &result.tables {
            println!(
                "  {:<18} {:>6} rows  {:>6} desired  {:>6} current",
                table.name, table.rows, table.desired, table.current
            );
        }
    }

    println!();
    if result.inconsistencies.is_empty() {
        println!("Indexes: OK");
    } else {
        println!("Indexes: {} problems", result.inconsistencies.len());
        for problem in &result.inconsistencies {
            println!("  {problem}");
        }
    }
}
