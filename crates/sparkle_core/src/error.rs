//! Error types for the Sparkle model.

use crate::value::PrimaryKey;
use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur in model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The named table does not exist in the model.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// Name of the table.
        name: String,
    },

    /// Direct access to a primary key absent from its table.
    #[error("row not found: {pkey} in table {table}")]
    RowNotFound {
        /// The table searched.
        table: String,
        /// The key that was not found.
        pkey: PrimaryKey,
    },

    /// The schema the model was built from is inconsistent.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl ModelError {
    /// Creates an unknown table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates a row not found error.
    pub fn row_not_found(table: impl Into<String>, pkey: PrimaryKey) -> Self {
        Self::RowNotFound {
            table: table.into(),
            pkey,
        }
    }
}

/// Schema misconfiguration, detected when the schema is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Two descriptors share a name.
    #[error("table {0} declared twice")]
    DuplicateTable(String),

    /// A descriptor refers to a table that is not declared.
    #[error("table {table} refers to undeclared table {missing}")]
    UnknownTable {
        /// The referring table.
        table: String,
        /// The missing table.
        missing: String,
    },

    /// A declared child has no foreign key pointing at its parent.
    #[error("table {child} has no foreign key to parent {parent}")]
    MissingForeignKey {
        /// Child table.
        child: String,
        /// Parent table.
        parent: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::row_not_found("host", PrimaryKey::from("h9"));
        assert_eq!(err.to_string(), "row not found: h9 in table host");

        let err = ModelError::from(SchemaError::MissingForeignKey {
            child: "nic".into(),
            parent: "host".into(),
        });
        assert!(err.to_string().contains("nic"));
        assert!(err.to_string().contains("host"));
    }
}
