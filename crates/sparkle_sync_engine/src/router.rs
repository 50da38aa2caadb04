//! Message routing abstraction.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use sparkle_sync_protocol::Message;
use std::sync::atomic::{AtomicBool, Ordering};

/// Delivers messages to named peers.
///
/// Delivery is fire-and-forget: an `Ok` only means the message was handed
/// to the transport. Framing, retries and peer discovery belong to the
/// implementation.
pub trait Router: Send + Sync {
    /// Sends a message to a peer.
    fn send(&self, message: &Message, peer: &str) -> SyncResult<()>;
}

/// A router that records messages instead of delivering them.
///
/// Used by tests, by loopback setups and by the CLI replay command.
#[derive(Debug, Default)]
pub struct MemoryRouter {
    sent: Mutex<Vec<(String, Message)>>,
    failing: AtomicBool,
}

impl MemoryRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends fail with a retryable error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Removes and returns all recorded `(peer, message)` pairs.
    pub fn take(&self) -> Vec<(String, Message)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns recorded messages addressed to `peer` without removing them.
    pub fn sent_to(&self, peer: &str) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Router for MemoryRouter {
    fn send(&self, message: &Message, peer: &str) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::router_retryable(format!("peer {peer} unreachable")));
        }
        self.sent.lock().push((peer.to_string(), message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_drains() {
        let router = MemoryRouter::new();
        router.send(&Message::resync(), "a").unwrap();
        router.send(&Message::update("i", 1, &[]), "b").unwrap();

        assert_eq!(router.len(), 2);
        assert_eq!(router.sent_to("a"), vec![Message::Resync]);

        let sent = router.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "b");
        assert!(router.is_empty());
    }

    #[test]
    fn failing_router() {
        let router = MemoryRouter::new();
        router.set_failing(true);
        let err = router.send(&Message::resync(), "a").unwrap_err();
        assert!(err.is_retryable());
        assert!(router.is_empty());
    }
}
