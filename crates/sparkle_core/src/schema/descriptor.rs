//! Static table descriptors.

use crate::value::{Part, PrimaryKey, Scalar};

/// Shape of a table's primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyShape {
    /// Single key column.
    Single(&'static str),
    /// Ordered key columns of a composite key.
    Composite(&'static [&'static str]),
}

impl KeyShape {
    /// Returns the key columns in order.
    pub fn columns(&self) -> &[&'static str] {
        match self {
            KeyShape::Single(column) => std::slice::from_ref(column),
            KeyShape::Composite(columns) => columns,
        }
    }

    /// Extracts the primary key from a row part.
    ///
    /// Returns `None` if any key column is missing.
    pub fn extract(&self, part: &Part) -> Option<PrimaryKey> {
        match self {
            KeyShape::Single(column) => part.get(*column).map(|v| PrimaryKey::Scalar(v.into())),
            KeyShape::Composite(columns) => columns
                .iter()
                .map(|c| part.get(*c).map(Scalar::from_value))
                .collect::<Option<Vec<_>>>()
                .map(PrimaryKey::Composite),
        }
    }
}

/// A many-to-many index derived from a join table.
///
/// Rows of `join_table` relate `local` (a primary key of the indexing
/// table) to `remote`; the index maps remote values to local keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join table watched for changes.
    pub join_table: &'static str,
    /// Join column holding the indexing table's primary key.
    pub local: &'static str,
    /// Join column the index is keyed by.
    pub remote: &'static str,
}

impl JoinSpec {
    /// Creates a join spec.
    pub const fn new(join_table: &'static str, local: &'static str, remote: &'static str) -> Self {
        Self {
            join_table,
            local,
            remote,
        }
    }
}

/// Foreign key column pointing at a parent table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Column on this table.
    pub column: &'static str,
    /// Table the column refers to.
    pub parent: &'static str,
}

/// Declarative description of one model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Table name.
    pub name: &'static str,
    /// Primary key shape.
    pub pkey: KeyShape,
    /// Columns with a secondary index.
    pub indexes: &'static [&'static str],
    /// Many-to-many indexes.
    pub joins: &'static [JoinSpec],
    /// Child tables, used for schema traversal only.
    pub children: &'static [&'static str],
    /// Foreign keys to parent tables.
    pub fkeys: &'static [ForeignKey],
    /// True for tables that only exist in memory.
    pub virtual_table: bool,
    /// Overrides whether primary keys are assigned by users.
    user_pkey: Option<bool>,
}

impl TableDescriptor {
    /// Creates a descriptor keyed by `uuid` with no indexes.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            pkey: KeyShape::Single("uuid"),
            indexes: &[],
            joins: &[],
            children: &[],
            fkeys: &[],
            virtual_table: false,
            user_pkey: None,
        }
    }

    /// Sets a single-column primary key.
    #[must_use]
    pub const fn pkey(mut self, column: &'static str) -> Self {
        self.pkey = KeyShape::Single(column);
        self
    }

    /// Sets a composite primary key.
    #[must_use]
    pub const fn composite_pkey(mut self, columns: &'static [&'static str]) -> Self {
        self.pkey = KeyShape::Composite(columns);
        self
    }

    /// Sets the secondary index columns.
    #[must_use]
    pub const fn indexes(mut self, columns: &'static [&'static str]) -> Self {
        self.indexes = columns;
        self
    }

    /// Sets the many-to-many indexes.
    #[must_use]
    pub const fn joins(mut self, joins: &'static [JoinSpec]) -> Self {
        self.joins = joins;
        self
    }

    /// Sets the child tables.
    #[must_use]
    pub const fn children(mut self, children: &'static [&'static str]) -> Self {
        self.children = children;
        self
    }

    /// Sets the foreign keys.
    #[must_use]
    pub const fn fkeys(mut self, fkeys: &'static [ForeignKey]) -> Self {
        self.fkeys = fkeys;
        self
    }

    /// Marks the table as memory-only.
    #[must_use]
    pub const fn virtual_table(mut self) -> Self {
        self.virtual_table = true;
        self
    }

    /// Overrides the user-assigned primary key flag.
    #[must_use]
    pub const fn user_pkey(mut self, value: bool) -> Self {
        self.user_pkey = Some(value);
        self
    }

    /// Whether primary keys of this table are assigned by users rather than
    /// generated. Defaults to true for anything not keyed by `uuid`.
    pub fn has_user_pkey(&self) -> bool {
        self.user_pkey
            .unwrap_or(!matches!(self.pkey, KeyShape::Single("uuid")))
    }

    /// Returns the foreign key column pointing at `parent`.
    pub fn fkey_to(&self, parent: &str) -> Option<&'static str> {
        self.fkeys
            .iter()
            .find(|fk| fk.parent == parent)
            .map(|fk| fk.column)
    }

    /// Extracts this table's primary key from a row part.
    pub fn primary_key(&self, part: &Part) -> Option<PrimaryKey> {
        self.pkey.extract(part)
    }
}

/// Shorthand for a foreign key whose column is named after its parent.
pub const fn fk(parent: &'static str) -> ForeignKey {
    ForeignKey {
        column: parent,
        parent,
    }
}
