//! # Sparkle Core
//!
//! Dual-state entity store for the Sparkle coordinator.
//!
//! Every entity is a [`Row`] carrying up to two parts: the *desired* state
//! set by operators and placement, and the *current* state reported by
//! host agents. This crate provides:
//!
//! - [`Schema`]: static table descriptors, validated once, with
//!   precomputed relationship paths used for tenant derivation
//! - [`Table`]: rows keyed by [`PrimaryKey`] with per-state secondary
//!   indexes and join-table derived indexes
//! - [`Model`]: the registry of all tables, wiring join indexes and
//!   driving [`Observers`] on every mutation
//! - [`Change`]: the `(table, pkey, state, part)` tuple used by
//!   [`Model::dump`], [`Model::load`] and replication
//!
//! ```
//! use sparkle_core::{Filter, Model, PrimaryKey, State};
//! use serde_json::json;
//!
//! let mut model = Model::standard()?;
//! let part = json!({"hwaddr": "aa:bb", "host": "h1"}).as_object().cloned();
//! model.update_row("nic", PrimaryKey::from("aa:bb"), State::Current, part)?;
//!
//! let nics = model.table("nic")?.list(&Filter::new().eq("host", "h1"));
//! assert_eq!(nics.len(), 1);
//! # Ok::<(), sparkle_core::ModelError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
pub mod error;
pub mod index;
pub mod model;
pub mod observer;
pub mod row;
pub mod schema;
pub mod table;
pub mod types;
pub mod value;

pub use change::{Change, RowRef};
pub use error::{ModelError, ModelResult, SchemaError};
pub use index::{FieldIndex, IndexView, JoinIndex};
pub use model::{Inconsistency, Model, SharedModel};
pub use observer::{HandlerToken, Hook, Interest, Observers, RowEvent};
pub use row::Row;
pub use schema::{Schema, TableDescriptor};
pub use table::{Filter, Table};
pub use types::{PerState, State};
pub use value::{Part, PrimaryKey, Scalar};
