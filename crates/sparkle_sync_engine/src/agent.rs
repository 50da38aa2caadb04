//! Host-side replica that talks Twilight to the coordinator.

use crate::config::AgentConfig;
use crate::error::{SyncError, SyncResult};
use crate::keep_alive::KeepAlive;
use crate::router::Router;
use crate::twilight::Received;
use crate::validate::ensure_known_tables;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sparkle_core::{Change, Model, PrimaryKey, State};
use sparkle_sync_protocol::{decode_change, Message};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counters kept by an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    /// Inbound messages of any kind.
    pub messages_received: u64,
    /// Desired-state entries applied.
    pub changes_applied: u64,
    /// Entries dropped as malformed or not desired state.
    pub changes_rejected: u64,
    /// Resync requests sent to the coordinator.
    pub resyncs_requested: u64,
    /// Full current-state snapshots sent.
    pub snapshots_sent: u64,
    /// Update messages sent, snapshots and keep-alives included.
    pub updates_sent: u64,
}

#[derive(Debug)]
struct AgentState {
    model: Model,
    incarnation: String,
    coordinator_incarnation: Option<String>,
    outseq: u64,
    inseq: u64,
    stats: AgentStats,
}

struct AgentInner {
    host: String,
    router: Arc<dyn Router>,
    config: AgentConfig,
    state: Mutex<AgentState>,
}

/// Local model of one host, replicated with the coordinator.
///
/// The agent reports the current state it observes and receives the
/// desired state assigned to it.
pub struct Agent {
    inner: Arc<AgentInner>,
    keep_alive: Option<KeepAlive>,
}

impl Agent {
    /// Creates an agent for `host`, seeding the model with its own host row.
    pub fn new(
        host: impl Into<String>,
        mut model: Model,
        router: Arc<dyn Router>,
        config: AgentConfig,
    ) -> SyncResult<Self> {
        let host = host.into();
        model.update_row(
            "host",
            PrimaryKey::from(host.as_str()),
            State::Current,
            json!({ "uuid": host }).as_object().cloned(),
        )?;

        let state = AgentState {
            model,
            incarnation: Uuid::new_v4().to_string(),
            coordinator_incarnation: None,
            outseq: 1,
            inseq: 0,
            stats: AgentStats::default(),
        };

        Ok(Self {
            inner: Arc::new(AgentInner {
                host,
                router,
                config,
                state: Mutex::new(state),
            }),
            keep_alive: None,
        })
    }

    /// Host this agent runs on.
    pub fn host(&self) -> &str {
        &self.inner.host
    }

    /// Incarnation stamped on outbound updates.
    pub fn incarnation(&self) -> String {
        self.inner.state.lock().incarnation.clone()
    }

    /// Agent counters.
    pub fn stats(&self) -> AgentStats {
        self.inner.state.lock().stats
    }

    /// Runs `f` with the local model.
    pub fn with_model<R>(&self, f: impl FnOnce(&Model) -> R) -> R {
        f(&self.inner.state.lock().model)
    }

    /// Runs `f` with the local model, mutably. Meant for subscribing
    /// observers; state changes should go through [`Agent::report`].
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut Model) -> R) -> R {
        f(&mut self.inner.state.lock().model)
    }

    /// Applies observed current-state changes locally and reports them.
    ///
    /// Fails without touching the model if any change is not current state
    /// or names an unknown table.
    pub fn report(&self, changes: Vec<Change>) -> SyncResult<()> {
        self.inner.report(changes)
    }

    /// Handles one message from the coordinator.
    pub fn receive(&self, message: &Message) -> Received {
        self.inner.receive(message)
    }

    /// Starts periodic empty reports.
    pub fn start_keep_alive(&mut self) -> SyncResult<()> {
        if self.is_keep_alive_running() {
            return Err(SyncError::KeepAliveRunning);
        }
        let Some(period) = self.inner.config.keep_alive_interval else {
            return Ok(());
        };

        let inner = Arc::downgrade(&self.inner);
        let keep_alive = KeepAlive::spawn(period, move || {
            if let Some(inner) = inner.upgrade() {
                if let Err(err) = inner.report(Vec::new()) {
                    warn!(host = %inner.host, %err, "keep-alive failed");
                }
            }
        })?;
        self.keep_alive = Some(keep_alive);
        Ok(())
    }

    /// Stops periodic reports.
    pub fn stop_keep_alive(&mut self) {
        if let Some(mut keep_alive) = self.keep_alive.take() {
            keep_alive.stop();
        }
    }

    /// Returns true while the keep-alive task runs.
    pub fn is_keep_alive_running(&self) -> bool {
        self.keep_alive.as_ref().is_some_and(KeepAlive::is_running)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("host", &self.inner.host)
            .field("keep_alive", &self.is_keep_alive_running())
            .finish_non_exhaustive()
    }
}

impl AgentInner {
    fn report(&self, changes: Vec<Change>) -> SyncResult<()> {
        if let Some(change) = changes.iter().find(|c| c.state != State::Current) {
            return Err(SyncError::InvalidChange(format!(
                "{} carries {} state",
                change.row_ref(),
                change.state
            )));
        }

        let mut state = self.state.lock();
        ensure_known_tables(state.model.schema(), &changes)?;
        state.model.load(changes.iter().cloned())?;
        let message = Message::update(state.incarnation.as_str(), state.outseq, &changes);
        self.send(&message);
        state.outseq += 1;
        state.stats.updates_sent += 1;
        Ok(())
    }

    fn receive(&self, message: &Message) -> Received {
        let mut state = self.state.lock();
        state.stats.messages_received += 1;

        match message {
            Message::Update {
                incarnation,
                seq,
                changes,
            } => self.update(&mut state, incarnation, *seq, changes),
            Message::Resync => {
                self.send_snapshot(&mut state);
                Received::ResyncSent
            }
            Message::Unknown => {
                warn!(host = %self.host, "ignoring unknown event");
                Received::Ignored
            }
        }
    }

    fn update(&self, state: &mut AgentState, incarnation: &str, seq: u64, entries: &[Value]) -> Received {
        let in_step = state.coordinator_incarnation.as_deref() == Some(incarnation) && state.inseq == seq;
        if !in_step && seq > 0 {
            info!(host = %self.host, incarnation, seq, expected = state.inseq, "requesting resync");
            self.send(&Message::resync());
            state.coordinator_incarnation = Some(incarnation.to_string());
            state.inseq = 0;
            state.stats.resyncs_requested += 1;
            return Received::Desynchronized;
        }

        let schema = state.model.schema().clone();
        let mut changes = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for entry in entries {
            match decode_change(entry) {
                Ok(change) if change.state != State::Desired => {
                    warn!(host = %self.host, row = %change.row_ref(), "dropping non-desired change");
                    rejected += 1;
                }
                Ok(change) if !schema.contains(&change.table) => {
                    warn!(host = %self.host, row = %change.row_ref(), "dropping change for unknown table");
                    rejected += 1;
                }
                Ok(change) => changes.push(change),
                Err(err) => {
                    warn!(host = %self.host, %err, %entry, "dropping malformed change");
                    rejected += 1;
                }
            }
        }
        state.stats.changes_rejected += rejected as u64;
        let applied = changes.len();

        if seq == 0 {
            let cleared = self.clear_desired(state);
            self.load(state, changes);
            state.coordinator_incarnation = Some(incarnation.to_string());
            state.inseq = 1;
            debug!(host = %self.host, incarnation, applied, cleared, "loaded desired snapshot");
            return Received::Snapshot {
                applied,
                deleted: cleared,
                rejected,
            };
        }

        self.load(state, changes);
        state.inseq += 1;
        debug!(host = %self.host, seq, applied, rejected, "merged desired update");
        Received::Merged { applied, rejected }
    }

    /// Drops every desired part, keeping current state and observers.
    fn clear_desired(&self, state: &mut AgentState) -> usize {
        let clears: Vec<Change> = state
            .model
            .dump(&[State::Desired])
            .into_iter()
            .map(|c| Change::delete(c.table, c.pkey, State::Desired))
            .collect();
        let cleared = clears.len();
        self.load(state, clears);
        cleared
    }

    fn load(&self, state: &mut AgentState, changes: Vec<Change>) {
        match state.model.load(changes) {
            Ok(applied) => state.stats.changes_applied += applied as u64,
            Err(err) => warn!(host = %self.host, %err, "failed to load changes"),
        }
    }

    fn send_snapshot(&self, state: &mut AgentState) {
        let changes = state.model.dump(&[State::Current]);
        info!(host = %self.host, rows = changes.len(), "sending current state");
        self.send(&Message::update(state.incarnation.as_str(), 0, &changes));
        state.outseq = 1;
        state.stats.snapshots_sent += 1;
        state.stats.updates_sent += 1;
    }

    fn send(&self, message: &Message) {
        if let Err(err) = self.router.send(message, &self.config.coordinator_peer) {
            warn!(host = %self.host, event = message.event(), %err, "send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MemoryRouter;
    use sparkle_core::{HandlerToken, Hook, Interest, ModelError, Part};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn part(value: Value) -> Option<Part> {
        value.as_object().cloned()
    }

    fn agent() -> (Agent, Arc<MemoryRouter>) {
        let router = Arc::new(MemoryRouter::new());
        let agent = Agent::new(
            "h1",
            Model::standard().unwrap(),
            router.clone(),
            AgentConfig::new("sparkle").without_keep_alive(),
        )
        .unwrap();
        (agent, router)
    }

    fn desired(seq: u64, incarnation: &str, changes: &[Change]) -> Message {
        Message::update(incarnation, seq, changes)
    }

    #[test]
    fn seeds_own_host_row() {
        let (agent, _) = agent();
        agent.with_model(|model| {
            let host = model.row("host", &PrimaryKey::from("h1")).unwrap();
            assert_eq!(host.get_current("uuid"), Some(&json!("h1")));
        });
    }

    #[test]
    fn report_sends_numbered_updates() {
        let (agent, router) = agent();
        agent
            .report(vec![Change::new("nic", "aa", State::Current, part(json!({"hwaddr": "aa"})))])
            .unwrap();
        agent.report(Vec::new()).unwrap();

        let sent = router.sent_to("sparkle");
        assert!(matches!(&sent[0], Message::Update { seq: 1, changes, .. } if changes.len() == 1));
        assert!(matches!(&sent[1], Message::Update { seq: 2, .. }));
        assert!(agent.with_model(|m| m.get("nic", &PrimaryKey::from("aa")).is_some()));
    }

    #[test]
    fn report_refuses_desired_state() {
        let (agent, router) = agent();
        let err = agent
            .report(vec![Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"})))])
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidChange(_)));
        assert!(router.is_empty());
    }

    #[test]
    fn report_with_unknown_table_applies_nothing() {
        let (agent, router) = agent();
        let err = agent
            .report(vec![
                Change::new("nic", "aa", State::Current, part(json!({"hwaddr": "aa"}))),
                Change::new("bogus", "x", State::Current, part(json!({"uuid": "x"}))),
            ])
            .unwrap_err();
        assert!(matches!(err, SyncError::Model(ModelError::UnknownTable { .. })));
        assert!(router.is_empty());
        assert!(agent.with_model(|m| m.get("nic", &PrimaryKey::from("aa")).is_none()));

        // The failed batch did not use up a sequence number.
        agent.report(Vec::new()).unwrap();
        assert!(matches!(&router.sent_to("sparkle")[0], Message::Update { seq: 1, .. }));
    }

    #[test]
    fn resync_sends_current_snapshot() {
        let (agent, router) = agent();
        agent.report(Vec::new()).unwrap();
        router.take();

        assert_eq!(agent.receive(&Message::resync()), Received::ResyncSent);
        let sent = router.take();
        assert_eq!(
            sent[0].1.to_value().unwrap()["changes"],
            json!([["host", "h1", "current", {"uuid": "h1"}]])
        );
        assert!(sent[0].1.is_snapshot());

        agent.report(Vec::new()).unwrap();
        assert!(matches!(router.take()[0].1, Message::Update { seq: 1, .. }));
    }

    #[test]
    fn out_of_step_update_requests_resync() {
        let (agent, router) = agent();
        let update = desired(
            4,
            "S",
            &[Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"})))],
        );
        assert_eq!(agent.receive(&update), Received::Desynchronized);
        assert_eq!(router.take(), vec![("sparkle".to_string(), Message::Resync)]);
        assert!(agent.with_model(|m| m.get("nic", &PrimaryKey::from("aa")).is_none()));
    }

    #[test]
    fn snapshot_replaces_desired_state_only() {
        let (agent, _) = agent();
        agent.receive(&desired(
            0,
            "S",
            &[Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"})))],
        ));
        agent.receive(&desired(
            1,
            "S",
            &[Change::new("nic", "bb", State::Desired, part(json!({"hwaddr": "bb"})))],
        ));

        let received = agent.receive(&desired(
            0,
            "T",
            &[Change::new("nic", "cc", State::Desired, part(json!({"hwaddr": "cc"})))],
        ));
        assert_eq!(
            received,
            Received::Snapshot {
                applied: 1,
                deleted: 2,
                rejected: 0
            }
        );

        agent.with_model(|m| {
            assert!(m.get("nic", &PrimaryKey::from("aa")).is_none());
            assert!(m.get("nic", &PrimaryKey::from("bb")).is_none());
            assert!(m.get("nic", &PrimaryKey::from("cc")).is_some());
            assert!(m.get("host", &PrimaryKey::from("h1")).is_some());
        });

        let received = agent.receive(&desired(1, "T", &[]));
        assert_eq!(received, Received::Merged { applied: 0, rejected: 0 });
    }

    #[test]
    fn snapshot_keeps_observers() {
        let (agent, _) = agent();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        agent
            .with_model_mut(|m| {
                m.subscribe(
                    "nic",
                    Hook::CreateState,
                    HandlerToken::fresh(),
                    Interest::DESIRED,
                    move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    },
                )
            })
            .unwrap();

        for incarnation in ["S", "T"] {
            agent.receive(&desired(
                0,
                incarnation,
                &[Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"})))],
            ));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drops_unknown_tables_from_coordinator() {
        let (agent, _) = agent();
        agent.receive(&desired(0, "S", &[]));
        let received = agent.receive(&desired(
            1,
            "S",
            &[
                Change::new("bogus", "x", State::Desired, part(json!({"uuid": "x"}))),
                Change::new("nic", "aa", State::Desired, part(json!({"hwaddr": "aa"}))),
            ],
        ));
        assert_eq!(received, Received::Merged { applied: 1, rejected: 1 });
        assert!(agent.with_model(|m| m.get("nic", &PrimaryKey::from("aa")).is_some()));
    }

    #[test]
    fn drops_current_state_from_coordinator() {
        let (agent, _) = agent();
        let received = agent.receive(&desired(
            0,
            "S",
            &[Change::new("nic", "aa", State::Current, part(json!({"hwaddr": "aa"})))],
        ));
        assert_eq!(
            received,
            Received::Snapshot {
                applied: 0,
                deleted: 0,
                rejected: 1
            }
        );
        assert_eq!(agent.stats().changes_rejected, 1);
    }
}
