//! # Sparkle Testkit
//!
//! Test utilities for Sparkle.
//!
//! This crate provides:
//! - Model fixtures and change builders
//! - A small schema with a tenant chain and a join table
//! - Property-based test generators using proptest
//! - A reference implementation of row state semantics
//!
//! ## Usage
//!
//! ```rust
//! use sparkle_testkit::prelude::*;
//!
//! let mut model = standard_model();
//! model.apply(current("host", "h1", serde_json::json!({"uuid": "h1"}))).unwrap();
//! assert_eq!(model.row_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
