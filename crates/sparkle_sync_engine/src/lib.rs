//! # Sparkle Sync Engine
//!
//! Twilight synchronization between the coordinator and its host agents.
//!
//! This crate provides:
//! - [`Twilight`], the coordinator's session with one host
//! - [`Coordinator`], which routes host traffic and fans out desired state
//! - [`Agent`], the host-side replica
//! - validation of host reports against the reportable tables
//! - a periodic keep-alive task
//! - the [`Router`] seam and an in-memory router
//!
//! ## Protocol
//!
//! Each side numbers its outbound updates within an incarnation. A
//! sequence of 0 marks a full snapshot. A receiver that sees a foreign
//! incarnation or a gap in the sequence applies nothing and asks for a
//! resync instead, so lost, reordered or restarted streams heal on their
//! own.
//!
//! ## Key Invariants
//!
//! - Hosts only report current state; the coordinator only sends desired state
//! - Desynchronization never surfaces as an error
//! - A snapshot replaces exactly the rows its sender owned
//! - All model mutation goes through one lock

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod config;
mod coordinator;
mod error;
mod keep_alive;
mod router;
mod twilight;
mod validate;

pub use agent::{Agent, AgentStats};
pub use config::{AgentConfig, TwilightConfig, DEFAULT_KEEP_ALIVE_INTERVAL};
pub use coordinator::Coordinator;
pub use error::{Rejection, SyncError, SyncResult};
pub use keep_alive::KeepAlive;
pub use router::{MemoryRouter, Router};
pub use twilight::{Received, Sequences, SessionStats, Twilight};
pub use validate::{check_change, is_reportable, validate_change, REPORTABLE_TABLES};
