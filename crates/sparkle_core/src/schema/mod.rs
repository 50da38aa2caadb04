//! Schema: table descriptors plus the precomputed relationship graph.
//!
//! The schema is built once from an ordered descriptor list. Construction
//! validates every cross-table reference and precomputes
//!
//! - every path from a root table down the declared `children` edges,
//!   prefixes included, with cycles cut,
//! - the `(child, parent) -> foreign key column` edge map,
//! - for each table, the foreign-key chains leading up to a tenant.

mod descriptor;
mod standard;

pub use descriptor::{fk, ForeignKey, JoinSpec, KeyShape, TableDescriptor};
pub use standard::STANDARD_TABLES;

use crate::error::SchemaError;
use std::collections::HashMap;

/// Name of the table whose rows own tenant-scoped entities.
pub const TENANT_TABLE: &str = "tenant";

/// One hop of a tenant chain: read `fkey` from the current row's desired
/// state and continue in `parent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// Foreign key column on the current table.
    pub fkey: &'static str,
    /// Table the key points into.
    pub parent: &'static str,
}

/// Validated schema with precomputed traversal tables.
#[derive(Debug, Clone)]
pub struct Schema {
    tables: Vec<TableDescriptor>,
    by_name: HashMap<&'static str, usize>,
    fkeys: HashMap<(&'static str, &'static str), &'static str>,
    paths: Vec<Vec<&'static str>>,
    tenant_chains: HashMap<&'static str, Vec<Vec<Hop>>>,
}

impl Schema {
    /// Builds and validates a schema from descriptors.
    pub fn new(tables: &[TableDescriptor]) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            if by_name.insert(table.name, i).is_some() {
                return Err(SchemaError::DuplicateTable(table.name.to_string()));
            }
        }

        let missing = |table: &str, name: &str| SchemaError::UnknownTable {
            table: table.to_string(),
            missing: name.to_string(),
        };

        let mut fkeys = HashMap::new();
        for table in tables {
            for fk in table.fkeys {
                if !by_name.contains_key(fk.parent) {
                    return Err(missing(table.name, fk.parent));
                }
                fkeys.insert((table.name, fk.parent), fk.column);
            }
            for join in table.joins {
                if !by_name.contains_key(join.join_table) {
                    return Err(missing(table.name, join.join_table));
                }
            }
        }

        for table in tables {
            for child in table.children {
                if !by_name.contains_key(child) {
                    return Err(missing(table.name, child));
                }
                if !fkeys.contains_key(&(*child, table.name)) {
                    return Err(SchemaError::MissingForeignKey {
                        child: child.to_string(),
                        parent: table.name.to_string(),
                    });
                }
            }
        }

        let mut schema = Self {
            tables: tables.to_vec(),
            by_name,
            fkeys,
            paths: Vec::new(),
            tenant_chains: HashMap::new(),
        };
        schema.paths = schema.compute_paths();
        schema.tenant_chains = schema.compute_tenant_chains();
        Ok(schema)
    }

    /// Builds the fleet schema.
    pub fn standard() -> Result<Self, SchemaError> {
        Self::new(STANDARD_TABLES)
    }

    /// Returns descriptors in declaration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Looks up a descriptor by name.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Returns true if the table is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterates over all root-to-node paths.
    pub fn iter_paths(&self) -> impl Iterator<Item = &[&'static str]> {
        self.paths.iter().map(Vec::as_slice)
    }

    /// Returns the foreign key on `child` pointing at `parent`.
    pub fn get_fkey(&self, child: &str, parent: &str) -> Option<&'static str> {
        self.table(child)?.fkey_to(parent)
    }

    /// Foreign-key chains from `table` up to the tenant table.
    pub fn tenant_chains(&self, table: &str) -> &[Vec<Hop>] {
        self.tenant_chains
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn roots(&self) -> Vec<&'static str> {
        self.tables
            .iter()
            .filter(|t| !self.tables.iter().any(|p| p.children.contains(&t.name)))
            .map(|t| t.name)
            .collect()
    }

    fn compute_paths(&self) -> Vec<Vec<&'static str>> {
        let mut paths = Vec::new();
        for root in self.roots() {
            let mut stack = vec![vec![root]];
            while let Some(path) = stack.pop() {
                let last = path[path.len() - 1];
                if let Some(table) = self.table(last) {
                    for child in table.children.iter().rev() {
                        if !path.contains(child) {
                            let mut next = path.clone();
                            next.push(*child);
                            stack.push(next);
                        }
                    }
                }
                paths.push(path);
            }
        }
        paths
    }

    fn compute_tenant_chains(&self) -> HashMap<&'static str, Vec<Vec<Hop>>> {
        let mut chains: HashMap<&'static str, Vec<Vec<Hop>>> = HashMap::new();
        for path in &self.paths {
            // The bare `["tenant"]` path yields an empty chain: a tenant
            // row is its own tenant.
            if path[0] != TENANT_TABLE {
                continue;
            }
            let hops = path
                .windows(2)
                .rev()
                .filter_map(|pair| {
                    let (parent, child) = (pair[0], pair[1]);
                    self.fkeys
                        .get(&(child, parent))
                        .map(|&fkey| Hop { fkey, parent })
                })
                .collect();
            chains.entry(path[path.len() - 1]).or_default().push(hops);
        }
        chains
    }
}
