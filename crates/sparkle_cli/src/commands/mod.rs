//! CLI command implementations.

pub mod inspect;
pub mod replay;
pub mod tenants;

use sparkle_core::{Change, Model, State};
use std::fs;
use std::path::Path;

/// Reads a snapshot file: a JSON array of `[table, pkey, state, part]`.
pub fn read_snapshot(path: &Path) -> Result<Vec<Change>, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read snapshot {}: {e}", path.display()))?;
    let changes = serde_json::from_str(&text)
        .map_err(|e| format!("invalid snapshot {}: {e}", path.display()))?;
    Ok(changes)
}

/// Builds a fleet-schema model from a snapshot file.
pub fn load_model(path: &Path) -> Result<Model, Box<dyn std::error::Error>> {
    let mut model = Model::standard()?;
    model.load(read_snapshot(path)?)?;
    Ok(model)
}

/// Writes both states of every row as a snapshot file.
pub fn write_snapshot(model: &Model, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = serde_json::to_string_pretty(&model.dump(&State::ALL))?;
    fs::write(path, text)?;
    Ok(())
}
