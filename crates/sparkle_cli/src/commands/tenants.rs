//! Tenants command implementation.

use serde_json::Value;
use sparkle_core::{Model, PrimaryKey};
use std::path::Path;

/// Runs the tenants command.
pub fn run(
    path: &Path,
    table: &str,
    pkey: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = super::load_model(path)?;
    let tenants = tenants(&model, table, &parse_pkey(pkey))?;

    match format {
        "json" => {
            let keys: Vec<Value> = tenants.iter().map(PrimaryKey::to_value).collect();
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        _ => {
            if tenants.is_empty() {
                println!("{table}/{pkey}: no tenants");
            }
            for tenant in &tenants {
                println!("{tenant}");
            }
        }
    }
    Ok(())
}

/// Tenants of one row, in key order.
pub fn tenants(
    model: &Model,
    table: &str,
    pkey: &PrimaryKey,
) -> Result<Vec<PrimaryKey>, Box<dyn std::error::Error>> {
    let row = model.row(table, pkey)?;
    Ok(row.get_tenants(model).into_iter().collect())
}

/// Parses a key given on the command line. Anything that is not JSON is
/// taken as a plain string.
pub fn parse_pkey(text: &str) -> PrimaryKey {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => PrimaryKey::from_value(&value),
        Err(_) => PrimaryKey::from(text),
    }
}
