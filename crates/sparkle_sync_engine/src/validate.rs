//! Validation of host-reported change entries.

use crate::error::{Rejection, SyncResult};
use serde_json::Value;
use sparkle_core::{Change, ModelError, Schema, State};
use sparkle_sync_protocol::decode_change;

/// Tables whose current state hosts are allowed to report.
pub const REPORTABLE_TABLES: [&str; 5] = ["host", "nic", "bond", "nic_role", "host_disk"];

/// Returns true if hosts may report rows of `table`.
pub fn is_reportable(table: &str) -> bool {
    REPORTABLE_TABLES.contains(&table)
}

/// Fails if any change names a table the schema does not declare.
///
/// Run before loading a batch so a bad entry cannot leave it half applied.
pub(crate) fn ensure_known_tables(schema: &Schema, changes: &[Change]) -> SyncResult<()> {
    match changes.iter().find(|c| !schema.contains(&c.table)) {
        Some(change) => Err(ModelError::unknown_table(change.table.as_str()).into()),
        None => Ok(()),
    }
}

/// Decodes and validates one raw entry of an inbound update.
pub fn validate_change(schema: &Schema, entry: &Value) -> Result<Change, Rejection> {
    let change = decode_change(entry).map_err(|e| Rejection::Malformed(e.to_string()))?;
    check_change(schema, &change)?;
    Ok(change)
}

/// Checks that a decoded change is one a host may report.
///
/// Only current state of reportable tables is accepted, and a non-null part
/// must carry every key column with values equal to the entry's key.
pub fn check_change(schema: &Schema, change: &Change) -> Result<(), Rejection> {
    if change.state != State::Current {
        return Err(Rejection::StateNotCurrent(change.state));
    }

    let descriptor = schema
        .table(&change.table)
        .filter(|_| is_reportable(&change.table))
        .ok_or_else(|| Rejection::TableNotReportable(change.table.clone()))?;

    let Some(part) = &change.part else {
        return Ok(());
    };

    if let Some(missing) = descriptor
        .pkey
        .columns()
        .iter()
        .find(|column| !part.contains_key(**column))
    {
        return Err(Rejection::MissingPrimaryKey((*missing).to_string()));
    }

    match descriptor.primary_key(part) {
        Some(found) if found == change.pkey => Ok(()),
        Some(found) => Err(Rejection::PrimaryKeyMismatch {
            expected: change.pkey.clone(),
            found,
        }),
        None => Err(Rejection::Malformed(format!(
            "cannot extract key of {}",
            change.table
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sparkle_core::PrimaryKey;

    fn schema() -> Schema {
        Schema::standard().unwrap()
    }

    #[test]
    fn accepts_current_host_rows() {
        let change = validate_change(&schema(), &json!(["host", "h1", "current", {"uuid": "h1"}]))
            .unwrap();
        assert_eq!(change.pkey, PrimaryKey::from("h1"));
    }

    #[test]
    fn accepts_deletes_without_part() {
        assert!(validate_change(&schema(), &json!(["nic", "aa", "current", null])).is_ok());
    }

    #[test]
    fn rejects_unlisted_tables() {
        let err = validate_change(&schema(), &json!(["tenant", "t1", "current", {"uuid": "t1"}]))
            .unwrap_err();
        assert_eq!(err, Rejection::TableNotReportable("tenant".into()));
    }

    #[test]
    fn rejects_desired_state() {
        let err = validate_change(&schema(), &json!(["host", "h1", "desired", {"uuid": "h1"}]))
            .unwrap_err();
        assert_eq!(err, Rejection::StateNotCurrent(State::Desired));
    }

    #[test]
    fn rejects_key_mismatch() {
        let err = validate_change(&schema(), &json!(["host", "h2", "current", {"uuid": "h1"}]))
            .unwrap_err();
        assert_eq!(
            err,
            Rejection::PrimaryKeyMismatch {
                expected: PrimaryKey::from("h2"),
                found: PrimaryKey::from("h1"),
            }
        );
    }

    #[test]
    fn rejects_missing_key_column() {
        let err = validate_change(&schema(), &json!(["host", "h1", "current", {"state": "up"}]))
            .unwrap_err();
        assert_eq!(err, Rejection::MissingPrimaryKey("uuid".into()));
    }

    #[test]
    fn composite_keys_compare_every_column() {
        let schema = schema();
        let ok = json!(["host_disk", ["h1", "d1"], "current", {"host": "h1", "disk": "d1"}]);
        assert!(validate_change(&schema, &ok).is_ok());

        let bad = json!(["host_disk", ["h1", "d2"], "current", {"host": "h1", "disk": "d1"}]);
        assert!(matches!(
            validate_change(&schema, &bad),
            Err(Rejection::PrimaryKeyMismatch { .. })
        ));

        let partial = json!(["host_disk", ["h1", "d1"], "current", {"host": "h1"}]);
        assert_eq!(
            validate_change(&schema, &partial).unwrap_err(),
            Rejection::MissingPrimaryKey("disk".into())
        );
    }

    #[test]
    fn malformed_entries_are_rejections() {
        assert!(matches!(
            validate_change(&schema(), &json!(["host", "h1"])),
            Err(Rejection::Malformed(_))
        ));
    }
}
