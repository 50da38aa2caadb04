//! Twilight: the coordinator's synchronization session with one host.
//!
//! A session tracks two numbered streams. Outbound, it ships the desired
//! state assigned to the host, tagged with a local incarnation and a
//! sequence number that restarts at 0 for every full snapshot. Inbound, it
//! checks the host's incarnation and sequence before touching the model:
//!
//! - `seq == 0` is a full snapshot and replaces every row the host owned,
//!   synthesizing deletes for rows the snapshot no longer mentions.
//! - a foreign incarnation or an unexpected sequence means messages were
//!   lost or the host restarted. Nothing is applied and a resync is
//!   requested instead.
//! - anything else is merged as a patch and advances the expected sequence.
//!
//! Neither direction ever fails: malformed entries are dropped, router
//! failures are logged, and desynchronization heals by resyncing.

use crate::config::TwilightConfig;
use crate::error::{SyncError, SyncResult};
use crate::keep_alive::KeepAlive;
use crate::router::Router;
use crate::validate::validate_change;
use parking_lot::Mutex;
use serde_json::Value;
use sparkle_core::{Change, RowRef, Schema, SharedModel, State};
use sparkle_sync_protocol::Message;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a session did with one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A full snapshot replaced the host's current state.
    Snapshot {
        /// Accepted snapshot entries.
        applied: usize,
        /// Deletes synthesized for rows missing from the snapshot.
        deleted: usize,
        /// Dropped entries.
        rejected: usize,
    },
    /// An incremental update was merged.
    Merged {
        /// Accepted entries.
        applied: usize,
        /// Dropped entries.
        rejected: usize,
    },
    /// The update did not follow the stream; a resync was requested.
    Desynchronized,
    /// The host asked for a resync and got one.
    ResyncSent,
    /// The event was not understood.
    Ignored,
}

/// Counters kept per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inbound messages of any kind.
    pub messages_received: u64,
    /// Entries accepted into the model.
    pub changes_applied: u64,
    /// Entries dropped by validation.
    pub changes_rejected: u64,
    /// Resync requests sent to the host.
    pub resyncs_requested: u64,
    /// Full desired-state snapshots sent.
    pub resyncs_sent: u64,
    /// Full current-state snapshots received.
    pub snapshots_applied: u64,
    /// Update messages sent, keep-alives included.
    pub updates_sent: u64,
}

/// Incarnations and sequence numbers of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequences {
    /// Incarnation stamped on outbound updates.
    pub local_incarnation: String,
    /// Sequence number of the next outbound update.
    pub local_sequence: u64,
    /// Incarnation the host is believed to run.
    pub remote_incarnation: String,
    /// Sequence number expected on the next inbound update.
    pub remote_sequence: u64,
}

#[derive(Debug)]
struct SessionState {
    peer: String,
    sequences: Sequences,
    current_state: BTreeSet<RowRef>,
    desired_state: BTreeMap<RowRef, BTreeSet<String>>,
    stats: SessionStats,
}

struct Session {
    host: String,
    router: Arc<dyn Router>,
    model: SharedModel,
    schema: Arc<Schema>,
    config: TwilightConfig,
    state: Mutex<SessionState>,
}

/// Synchronization session with one host agent.
pub struct Twilight {
    session: Arc<Session>,
    keep_alive: Option<KeepAlive>,
}

impl Twilight {
    /// Creates a session for `host`.
    ///
    /// Peer id and both incarnations start as random values so the first
    /// message from the real host forces a resync.
    pub fn new(
        host: impl Into<String>,
        model: SharedModel,
        router: Arc<dyn Router>,
        config: TwilightConfig,
    ) -> Self {
        let schema = model.lock().schema().clone();
        let state = SessionState {
            peer: Uuid::new_v4().to_string(),
            sequences: Sequences {
                local_incarnation: Uuid::new_v4().to_string(),
                local_sequence: 1,
                remote_incarnation: Uuid::new_v4().to_string(),
                remote_sequence: 0,
            },
            current_state: BTreeSet::new(),
            desired_state: BTreeMap::new(),
            stats: SessionStats::default(),
        };

        Self {
            session: Arc::new(Session {
                host: host.into(),
                router,
                model,
                schema,
                config,
                state: Mutex::new(state),
            }),
            keep_alive: None,
        }
    }

    /// Host this session talks to.
    pub fn host(&self) -> &str {
        &self.session.host
    }

    /// Router peer id of the host, as last seen.
    pub fn peer(&self) -> String {
        self.session.state.lock().peer.clone()
    }

    /// Handles one message from the host, sent from `peer`.
    pub fn receive(&self, message: &Message, peer: &str) -> Received {
        self.session.receive(message, peer)
    }

    /// Sends the full assigned desired state with sequence 0.
    pub fn resync(&self) {
        let mut state = self.session.state.lock();
        self.session.resync(&mut state);
    }

    /// Sends one update and advances the outbound sequence.
    pub fn send_changes(&self, changes: &[Change]) {
        let mut state = self.session.state.lock();
        self.session.send_changes(&mut state, changes);
    }

    /// Assigns a desired-state row to the host on behalf of `owner`.
    ///
    /// Returns true if the row was not assigned before.
    pub fn assign(&self, row: RowRef, owner: impl Into<String>) -> bool {
        let mut state = self.session.state.lock();
        let owners = state.desired_state.entry(row).or_default();
        let fresh = owners.is_empty();
        owners.insert(owner.into());
        fresh
    }

    /// Withdraws `owner`'s claim on a row.
    ///
    /// Returns true if that was the last owner and the row is no longer
    /// assigned.
    pub fn release(&self, row: &RowRef, owner: &str) -> bool {
        let mut state = self.session.state.lock();
        let Some(owners) = state.desired_state.get_mut(row) else {
            return false;
        };
        owners.remove(owner);
        if owners.is_empty() {
            state.desired_state.remove(row);
            return true;
        }
        false
    }

    /// Returns true if the row is assigned to the host.
    pub fn is_assigned(&self, row: &RowRef) -> bool {
        self.session.state.lock().desired_state.contains_key(row)
    }

    /// Rows assigned to the host, in order.
    pub fn assigned(&self) -> Vec<RowRef> {
        self.session.state.lock().desired_state.keys().cloned().collect()
    }

    /// Owners holding a row assigned.
    pub fn owners(&self, row: &RowRef) -> BTreeSet<String> {
        self.session
            .state
            .lock()
            .desired_state
            .get(row)
            .cloned()
            .unwrap_or_default()
    }

    /// Rows whose current state the host has reported.
    pub fn current_rows(&self) -> BTreeSet<RowRef> {
        self.session.state.lock().current_state.clone()
    }

    /// Snapshot of incarnations and sequence numbers.
    pub fn sequences(&self) -> Sequences {
        self.session.state.lock().sequences.clone()
    }

    /// Session counters.
    pub fn stats(&self) -> SessionStats {
        self.session.state.lock().stats
    }

    /// Starts periodic empty updates.
    ///
    /// Does nothing if keep-alive is disabled in the configuration.
    pub fn start_keep_alive(&mut self) -> SyncResult<()> {
        if self.is_keep_alive_running() {
            return Err(SyncError::KeepAliveRunning);
        }
        let Some(period) = self.session.config.keep_alive_interval else {
            return Ok(());
        };

        let session = Arc::downgrade(&self.session);
        let keep_alive = KeepAlive::spawn(period, move || {
            if let Some(session) = session.upgrade() {
                session.keep_alive();
            }
        })?;
        self.keep_alive = Some(keep_alive);
        Ok(())
    }

    /// Stops periodic updates.
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

impl std::fmt::Debug for Twilight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Twilight")
            .field("host", &self.session.host)
            .field("keep_alive", &self.is_keep_alive_running())
            .finish_non_exhaustive()
    }
}

impl Session {
    fn receive(&self, message: &Message, peer: &str) -> Received {
        let mut state = self.state.lock();
        state.peer = peer.to_string();
        state.stats.messages_received += 1;

        match message {
            Message::Update {
                incarnation,
                seq,
                changes,
            } => self.update(&mut state, incarnation, *seq, changes),
            Message::Resync => {
                self.resync(&mut state);
                Received::ResyncSent
            }
            Message::Unknown => {
                warn!(host = %self.host, peer, "ignoring unknown event");
                Received::Ignored
            }
        }
    }

    fn update(
        &self,
        state: &mut SessionState,
        incarnation: &str,
        seq: u64,
        entries: &[Value],
    ) -> Received {
        if seq == 0 {
            state.sequences.remote_incarnation = incarnation.to_string();
            state.sequences.remote_sequence = 1;
            let (changes, rejected) = self.valid_changes(state, entries);
            let applied = changes.len();
            let deleted = self.replace_current_state(state, changes);
            state.stats.snapshots_applied += 1;
            debug!(host = %self.host, incarnation, applied, deleted, rejected, "applied snapshot");
            return Received::Snapshot {
                applied,
                deleted,
                rejected,
            };
        }

        if incarnation != state.sequences.remote_incarnation {
            info!(host = %self.host, incarnation, seq, "host incarnation changed");
            state.sequences.remote_incarnation = incarnation.to_string();
            state.sequences.remote_sequence = 0;
            self.request_resync(state);
            return Received::Desynchronized;
        }

        if seq != state.sequences.remote_sequence {
            info!(
                host = %self.host,
                seq,
                expected = state.sequences.remote_sequence,
                "sequence gap"
            );
            state.sequences.remote_sequence = 0;
            self.request_resync(state);
            return Received::Desynchronized;
        }

        let (changes, rejected) = self.valid_changes(state, entries);
        let applied = changes.len();
        self.merge_current_state(state, changes);
        state.sequences.remote_sequence += 1;
        debug!(host = %self.host, seq, applied, rejected, "merged update");
        Received::Merged { applied, rejected }
    }

    fn valid_changes(&self, state: &mut SessionState, entries: &[Value]) -> (Vec<Change>, usize) {
        let mut changes = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for entry in entries {
            match validate_change(&self.schema, entry) {
                Ok(change) => changes.push(change),
                Err(reason) => {
                    warn!(host = %self.host, %reason, %entry, "dropping invalid change");
                    rejected += 1;
                }
            }
        }
        state.stats.changes_rejected += rejected as u64;
        (changes, rejected)
    }

    fn merge_current_state(&self, state: &mut SessionState, changes: Vec<Change>) {
        for change in &changes {
            if change.is_delete() {
                state.current_state.remove(&change.row_ref());
            } else {
                state.current_state.insert(change.row_ref());
            }
        }
        self.load(state, changes);
    }

    /// Replaces the host's rows with a snapshot. Returns how many deletes
    /// were synthesized.
    fn replace_current_state(&self, state: &mut SessionState, changes: Vec<Change>) -> usize {
        let mut owned: BTreeSet<RowRef> = changes.iter().map(Change::row_ref).collect();
        let deletes: Vec<Change> = state
            .current_state
            .difference(&owned)
            .map(|row| Change::delete(row.table.clone(), row.pkey.clone(), State::Current))
            .collect();

        for change in changes.iter().filter(|c| c.is_delete()) {
            owned.remove(&change.row_ref());
        }
        state.current_state = owned;

        let deleted = deletes.len();
        self.load(state, changes.into_iter().chain(deletes).collect());
        deleted
    }

    fn load(&self, state: &mut SessionState, changes: Vec<Change>) {
        match self.model.lock().load(changes) {
            Ok(applied) => state.stats.changes_applied += applied as u64,
            Err(err) => warn!(host = %self.host, %err, "failed to load changes"),
        }
    }

    fn resync(&self, state: &mut SessionState) {
        state.sequences.local_sequence = 0;

        let changes: Vec<Change> = {
            let model = self.model.lock();
            state
                .desired_state
                .keys()
                .map(|row| {
                    let part = model
                        .get(&row.table, &row.pkey)
                        .and_then(|r| r.desired().cloned());
                    Change::new(row.table.clone(), row.pkey.clone(), State::Desired, part)
                })
                .collect()
        };

        info!(host = %self.host, rows = changes.len(), "sending resync");
        state.stats.resyncs_sent += 1;
        self.send_changes(state, &changes);
    }

    fn request_resync(&self, state: &mut SessionState) {
        state.stats.resyncs_requested += 1;
        self.send(state, &Message::resync());
    }

    fn send_changes(&self, state: &mut SessionState, changes: &[Change]) {
        let message = Message::update(
            state.sequences.local_incarnation.as_str(),
            state.sequences.local_sequence,
            changes,
        );
        self.send(state, &message);
        state.sequences.local_sequence += 1;
        state.stats.updates_sent += 1;
    }

    fn send(&self, state: &SessionState, message: &Message) {
        if let Err(err) = self.router.send(message, &state.peer) {
            warn!(host = %self.host, peer = %state.peer, event = message.event(), %err, "send failed");
        }
    }

    fn keep_alive(&self) {
        let mut state = self.state.lock();
        debug!(host = %self.host, seq = state.sequences.local_sequence, "keep-alive");
        self.send_changes(&mut state, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MemoryRouter;
    use serde_json::json;
    use sparkle_core::{Model, PrimaryKey};

    struct Fixture {
        model: SharedModel,
        router: Arc<MemoryRouter>,
        twilight: Twilight,
    }

    fn fixture() -> Fixture {
        let model = Model::standard().unwrap().into_shared();
        let router = Arc::new(MemoryRouter::new());
        let twilight = Twilight::new(
            "h1",
            model.clone(),
            router.clone(),
            TwilightConfig::new().without_keep_alive(),
        );
        Fixture {
            model,
            router,
            twilight,
        }
    }

    fn update(incarnation: &str, seq: u64, changes: Value) -> Message {
        Message::from_value(json!({
            "event": "update",
            "incarnation": incarnation,
            "seq": seq,
            "changes": changes,
        }))
        .unwrap()
    }

    #[test]
    fn starts_desynchronized() {
        let f = fixture();
        let sequences = f.twilight.sequences();
        assert_eq!(sequences.local_sequence, 1);
        assert_eq!(sequences.remote_sequence, 0);
        assert_ne!(sequences.local_incarnation, sequences.remote_incarnation);

        let received = f.twilight.receive(&update("A", 1, json!([])), "peer-1");
        assert_eq!(received, Received::Desynchronized);
        assert_eq!(f.router.take(), vec![("peer-1".to_string(), Message::Resync)]);
        assert_eq!(f.twilight.sequences().remote_incarnation, "A");
        assert_eq!(f.twilight.peer(), "peer-1");
    }

    #[test]
    fn snapshot_then_merge() {
        let f = fixture();
        let received = f.twilight.receive(
            &update(
                "A",
                0,
                json!([
                    ["host", "h1", "current", {"uuid": "h1", "state": "up"}],
                    ["nic", "aa", "current", {"hwaddr": "aa", "host": "h1"}],
                ]),
            ),
            "p",
        );
        assert_eq!(
            received,
            Received::Snapshot {
                applied: 2,
                deleted: 0,
                rejected: 0
            }
        );
        assert_eq!(f.twilight.sequences().remote_sequence, 1);

        let received = f.twilight.receive(
            &update("A", 1, json!([["host", "h1", "current", {"uuid": "h1", "state": "down"}]])),
            "p",
        );
        assert_eq!(received, Received::Merged { applied: 1, rejected: 0 });
        assert_eq!(f.twilight.sequences().remote_sequence, 2);

        let model = f.model.lock();
        let host = model.row("host", &PrimaryKey::from("h1")).unwrap();
        assert_eq!(host.get_current("state"), Some(&json!("down")));
        assert!(f.router.is_empty());
    }

    #[test]
    fn merge_tracks_ownership() {
        let f = fixture();
        f.twilight.receive(&update("A", 0, json!([])), "p");
        f.twilight.receive(
            &update("A", 1, json!([["nic", "aa", "current", {"hwaddr": "aa"}]])),
            "p",
        );
        assert!(f.twilight.current_rows().contains(&RowRef::new("nic", "aa")));

        f.twilight
            .receive(&update("A", 2, json!([["nic", "aa", "current", null]])), "p");
        assert!(f.twilight.current_rows().is_empty());
        assert!(f.model.lock().get("nic", &PrimaryKey::from("aa")).is_none());
    }

    #[test]
    fn snapshot_deletes_rows_no_longer_reported() {
        let f = fixture();
        f.twilight.receive(
            &update(
                "A",
                0,
                json!([
                    ["host", "h1", "current", {"uuid": "h1"}],
                    ["nic", "n1", "current", {"hwaddr": "n1"}],
                ]),
            ),
            "p",
        );

        let received = f.twilight.receive(
            &update("B", 0, json!([["host", "h1", "current", {"uuid": "h1"}]])),
            "p",
        );
        assert_eq!(
            received,
            Received::Snapshot {
                applied: 1,
                deleted: 1,
                rejected: 0
            }
        );
        assert_eq!(
            f.twilight.current_rows(),
            BTreeSet::from([RowRef::new("host", "h1")])
        );
        let model = f.model.lock();
        assert!(model.get("nic", &PrimaryKey::from("n1")).is_none());
        assert!(model.get("host", &PrimaryKey::from("h1")).is_some());
    }

    #[test]
    fn sequence_gap_requests_resync_without_applying() {
        let f = fixture();
        f.twilight.receive(&update("A", 0, json!([])), "p");
        f.twilight.receive(&update("A", 1, json!([])), "p");
        f.twilight.receive(&update("A", 2, json!([])), "p");
        assert_eq!(f.twilight.sequences().remote_sequence, 3);

        let received = f.twilight.receive(
            &update("A", 5, json!([["host", "h1", "current", {"uuid": "h1"}]])),
            "p",
        );
        assert_eq!(received, Received::Desynchronized);
        assert_eq!(f.twilight.sequences().remote_sequence, 0);
        assert_eq!(f.router.take(), vec![("p".to_string(), Message::Resync)]);
        assert_eq!(f.model.lock().row_count(), 0);
    }

    #[test]
    fn invalid_entries_are_dropped() {
        let f = fixture();
        let received = f.twilight.receive(
            &update(
                "A",
                0,
                json!([
                    ["tenant", "t1", "current", {"uuid": "t1"}],
                    ["host", "h1", "desired", {"uuid": "h1"}],
                    ["host", "h2", "current", {"uuid": "h1"}],
                    ["host", "h3"],
                    ["host", "h1", "current", {"uuid": "h1"}],
                ]),
            ),
            "p",
        );
        assert_eq!(
            received,
            Received::Snapshot {
                applied: 1,
                deleted: 0,
                rejected: 4
            }
        );
        assert_eq!(f.twilight.stats().changes_rejected, 4);
        assert_eq!(f.model.lock().row_count(), 1);
    }

    #[test]
    fn resync_sends_assigned_desired_state() {
        let f = fixture();
        f.model
            .lock()
            .update_row(
                "nic",
                PrimaryKey::from("aa"),
                State::Desired,
                json!({"hwaddr": "aa", "mtu": 9000}).as_object().cloned(),
            )
            .unwrap();
        assert!(f.twilight.assign(RowRef::new("nic", "aa"), "placement"));
        assert!(f.twilight.assign(RowRef::new("nic", "gone"), "placement"));

        let received = f.twilight.receive(&Message::resync(), "p");
        assert_eq!(received, Received::ResyncSent);

        let sent = f.router.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].1.to_value().unwrap(),
            json!({
                "event": "update",
                "incarnation": f.twilight.sequences().local_incarnation,
                "seq": 0,
                "changes": [
                    ["nic", "aa", "desired", {"hwaddr": "aa", "mtu": 9000}],
                    ["nic", "gone", "desired", null],
                ],
            })
        );
        assert_eq!(f.twilight.sequences().local_sequence, 1);
    }

    #[test]
    fn ownership_is_reference_counted() {
        let f = fixture();
        let row = RowRef::new("disk", "d1");
        assert!(f.twilight.assign(row.clone(), "storage_pool"));
        assert!(!f.twilight.assign(row.clone(), "host_disk"));
        assert_eq!(f.twilight.owners(&row).len(), 2);

        assert!(!f.twilight.release(&row, "storage_pool"));
        assert!(f.twilight.is_assigned(&row));
        assert!(f.twilight.release(&row, "host_disk"));
        assert!(!f.twilight.is_assigned(&row));
        assert!(!f.twilight.release(&row, "host_disk"));
    }

    #[test]
    fn unknown_events_are_ignored() {
        let f = fixture();
        assert_eq!(f.twilight.receive(&Message::Unknown, "p"), Received::Ignored);
        assert!(f.router.is_empty());
        assert_eq!(f.twilight.stats().messages_received, 1);
    }

    #[test]
    fn router_failures_do_not_stop_the_session() {
        let f = fixture();
        f.router.set_failing(true);
        f.twilight.send_changes(&[]);
        assert_eq!(f.twilight.sequences().local_sequence, 2);

        f.router.set_failing(false);
        f.twilight.send_changes(&[]);
        let sent = f.router.take();
        assert!(matches!(&sent[0].1, Message::Update { seq: 2, .. }));
    }

    #[test]
    fn keep_alive_disabled_by_config() {
        let mut f = fixture();
        f.twilight.start_keep_alive().unwrap();
        assert!(!f.twilight.is_keep_alive_running());
    }
}
