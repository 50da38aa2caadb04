//! Coordinator: owns the shared model and one Twilight session per host.

use crate::config::TwilightConfig;
use crate::error::{SyncError, SyncResult};
use crate::router::Router;
use crate::twilight::{Received, Twilight};
use crate::validate::ensure_known_tables;
use sparkle_core::{Change, RowRef, SharedModel, State};
use sparkle_sync_protocol::Message;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes host traffic to sessions and fans desired-state changes out to
/// the hosts they are assigned to.
///
/// Deciding which rows go to which host is up to the caller, through
/// [`Coordinator::assign`] and [`Coordinator::release`].
pub struct Coordinator {
    model: SharedModel,
    router: Arc<dyn Router>,
    config: TwilightConfig,
    sessions: BTreeMap<String, Twilight>,
}

impl Coordinator {
    /// Creates a coordinator with no sessions.
    pub fn new(model: SharedModel, router: Arc<dyn Router>, config: TwilightConfig) -> Self {
        Self {
            model,
            router,
            config,
            sessions: BTreeMap::new(),
        }
    }

    /// The shared model.
    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// Session of a host, if one exists.
    pub fn session(&self, host: &str) -> Option<&Twilight> {
        self.sessions.get(host)
    }

    /// Hosts with a session, in order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    /// Returns the session of `host`, creating it on first use.
    ///
    /// New sessions start their keep-alive task when a tokio runtime is
    /// available.
    pub fn ensure_session(&mut self, host: &str) -> &Twilight {
        let Self {
            model,
            router,
            config,
            sessions,
        } = self;

        sessions.entry(host.to_string()).or_insert_with(|| {
            let mut session = Twilight::new(host, model.clone(), router.clone(), config.clone());
            match session.start_keep_alive() {
                Ok(()) => {}
                Err(SyncError::NoRuntime) => debug!(host, "no runtime, keep-alive disabled"),
                Err(err) => warn!(host, %err, "failed to start keep-alive"),
            }
            info!(host, "session created");
            session
        })
    }

    /// Delivers a message from `host`, received from router peer `peer`.
    pub fn receive(&mut self, host: &str, peer: &str, message: &Message) -> Received {
        self.ensure_session(host).receive(message, peer)
    }

    /// Assigns a row to a host and ships its desired state if the host did
    /// not have it yet.
    pub fn assign(&mut self, host: &str, row: RowRef, owner: impl Into<String>) {
        let part = self
            .model
            .lock()
            .get(&row.table, &row.pkey)
            .and_then(|r| r.desired().cloned());

        let session = self.ensure_session(host);
        if session.assign(row.clone(), owner) {
            debug!(host, %row, "row assigned");
            session.send_changes(&[Change::new(row.table, row.pkey, State::Desired, part)]);
        }
    }

    /// Withdraws `owner`'s claim on a row. Once the last owner is gone the
    /// host is told to delete its desired state.
    ///
    /// Returns true if the row was unassigned.
    pub fn release(&mut self, host: &str, row: &RowRef, owner: &str) -> SyncResult<bool> {
        let session = self
            .sessions
            .get(host)
            .ok_or_else(|| SyncError::UnknownSession(host.to_string()))?;

        if !session.release(row, owner) {
            return Ok(false);
        }
        debug!(host, %row, "row released");
        session.send_changes(&[Change::delete(
            row.table.clone(),
            row.pkey.clone(),
            State::Desired,
        )]);
        Ok(true)
    }

    /// Applies desired-state changes and forwards each to every host the
    /// row is assigned to, one batch per host.
    ///
    /// Non-deletes are loaded before fan-out and deletes after it. Any
    /// current-state change or unknown table rejects the whole batch before
    /// the model is touched. Returns how many changes were loaded.
    pub fn apply_desired(&mut self, changes: Vec<Change>) -> SyncResult<usize> {
        if let Some(change) = changes.iter().find(|c| c.state != State::Desired) {
            return Err(SyncError::InvalidChange(format!(
                "{} carries {} state",
                change.row_ref(),
                change.state
            )));
        }

        let (deletes, upserts): (Vec<Change>, Vec<Change>) =
            changes.iter().cloned().partition(Change::is_delete);

        let mut loaded = {
            let mut model = self.model.lock();
            ensure_known_tables(model.schema(), &changes)?;
            model.load(upserts)?
        };

        let mut batches: BTreeMap<&str, Vec<Change>> = BTreeMap::new();
        for change in &changes {
            let row = change.row_ref();
            for (host, session) in &self.sessions {
                if session.is_assigned(&row) {
                    batches.entry(host.as_str()).or_default().push(change.clone());
                }
            }
        }

        loaded += self.model.lock().load(deletes)?;

        for (host, batch) in batches {
            if let Some(session) = self.sessions.get(host) {
                debug!(host, changes = batch.len(), "forwarding desired changes");
                session.send_changes(&batch);
            }
        }
        Ok(loaded)
    }

    /// Tears down a host's session. Returns false if there was none.
    pub fn disconnect(&mut self, host: &str) -> bool {
        match self.sessions.remove(host) {
            Some(mut session) => {
                session.stop_keep_alive();
                info!(host, "session closed");
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MemoryRouter;
    use serde_json::{json, Value};
    use sparkle_core::{Model, ModelError, Part, PrimaryKey};

    fn part(value: Value) -> Option<Part> {
        value.as_object().cloned()
    }

    fn coordinator() -> (Coordinator, Arc<MemoryRouter>) {
        let model = Model::standard().unwrap().into_shared();
        let router = Arc::new(MemoryRouter::new());
        let coordinator = Coordinator::new(
            model,
            router.clone(),
            TwilightConfig::new().without_keep_alive(),
        );
        (coordinator, router)
    }

    #[test]
    fn sessions_are_created_on_first_contact() {
        let (mut coordinator, router) = coordinator();
        let received = coordinator.receive(
            "h1",
            "peer-1",
            &Message::update("A", 0, &[Change::new(
                "host",
                "h1",
                State::Current,
                part(json!({"uuid": "h1"})),
            )]),
        );
        assert!(matches!(received, Received::Snapshot { applied: 1, .. }));
        assert_eq!(coordinator.hosts().collect::<Vec<_>>(), vec!["h1"]);
        assert!(router.is_empty());
        assert!(coordinator
            .model()
            .lock()
            .get("host", &PrimaryKey::from("h1"))
            .is_some());
    }

    #[test]
    fn assign_ships_row_once() {
        let (mut coordinator, router) = coordinator();
        coordinator
            .apply_desired(vec![Change::new(
                "disk",
                "d1",
                State::Desired,
                part(json!({"id": "d1", "storage_pool": "p1"})),
            )])
            .unwrap();
        coordinator.receive("h1", "peer-1", &Message::update("A", 0, &[]));

        let row = RowRef::new("disk", "d1");
        coordinator.assign("h1", row.clone(), "storage_pool");
        coordinator.assign("h1", row.clone(), "host_disk");

        let sent = router.sent_to("peer-1");
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].to_value().unwrap()["changes"],
            json!([["disk", "d1", "desired", {"id": "d1", "storage_pool": "p1"}]])
        );

        assert!(!coordinator.release("h1", &row, "storage_pool").unwrap());
        assert!(coordinator.release("h1", &row, "host_disk").unwrap());
        let sent = router.sent_to("peer-1");
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[1].to_value().unwrap()["changes"],
            json!([["disk", "d1", "desired", null]])
        );
    }

    #[test]
    fn release_requires_session() {
        let (mut coordinator, _) = coordinator();
        assert!(matches!(
            coordinator.release("h9", &RowRef::new("disk", "d1"), "x"),
            Err(SyncError::UnknownSession(host)) if host == "h9"
        ));
    }

    #[test]
    fn apply_desired_fans_out_by_assignment() {
        let (mut coordinator, router) = coordinator();
        coordinator.receive("h1", "p1", &Message::update("A", 0, &[]));
        coordinator.receive("h2", "p2", &Message::update("B", 0, &[]));
        coordinator.assign("h1", RowRef::new("nic", "aa"), "host");
        coordinator.assign("h2", RowRef::new("nic", "bb"), "host");
        router.take();

        let loaded = coordinator
            .apply_desired(vec![
                Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"}))),
                Change::new("nic", "bb", State::Desired, part(json!({"hwaddr": "bb"}))),
                Change::new("nic", "cc", State::Desired, part(json!({"hwaddr": "cc"}))),
                Change::delete("nic", "aa", State::Desired),
            ])
            .unwrap();
        assert_eq!(loaded, 4);

        let to_h1 = router.sent_to("p1");
        assert_eq!(to_h1.len(), 1);
        assert_eq!(to_h1[0].change_count(), 2);
        let to_h2 = router.sent_to("p2");
        assert_eq!(to_h2.len(), 1);
        assert_eq!(to_h2[0].change_count(), 1);

        let model = coordinator.model().lock();
        assert!(model.get("nic", &PrimaryKey::from("aa")).is_none());
        assert!(model.get("nic", &PrimaryKey::from("cc")).is_some());
    }

    #[test]
    fn apply_desired_rejects_current_state() {
        let (mut coordinator, _) = coordinator();
        let err = coordinator
            .apply_desired(vec![
                Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"}))),
                Change::new("host", "h1", State::Current, part(json!({"uuid": "h1"}))),
            ])
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidChange(_)));
        assert_eq!(coordinator.model().lock().row_count(), 0);
    }

    #[test]
    fn apply_desired_with_unknown_table_applies_nothing() {
        let (mut coordinator, router) = coordinator();
        let nic = RowRef::new("nic", "aa");
        coordinator.assign("h1", nic, "placement");
        router.take();

        let err = coordinator
            .apply_desired(vec![
                Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"}))),
                Change::new("bogus", "x", State::Desired, part(json!({"uuid": "x"}))),
            ])
            .unwrap_err();
        assert!(matches!(err, SyncError::Model(ModelError::UnknownTable { .. })));
        assert_eq!(coordinator.model().lock().row_count(), 0);
        assert!(router.is_empty());
    }

    #[test]
    fn disconnect_drops_session() {
        let (mut coordinator, _) = coordinator();
        coordinator.ensure_session("h1");
        assert!(coordinator.disconnect("h1"));
        assert!(!coordinator.disconnect("h1"));
        assert!(coordinator.session("h1").is_none());
    }
}
