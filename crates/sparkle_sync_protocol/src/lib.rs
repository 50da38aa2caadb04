//! # Sparkle Sync Protocol
//!
//! Wire messages exchanged between the coordinator and host agents.
//!
//! Every message is a JSON object tagged by `event`:
//!
//! ```json
//! {"event": "update", "incarnation": "…", "seq": 3,
//!  "changes": [["host", "h1", "current", {"uuid": "h1"}]]}
//! {"event": "resync"}
//! ```
//!
//! Change entries stay raw JSON inside [`Message::Update`] so a single
//! malformed entry can be dropped without losing the rest of the batch;
//! [`decode_change`] does the structural check for one entry.
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod message;

pub use error::{ProtocolError, ProtocolResult};
pub use message::{decode_change, Message};
