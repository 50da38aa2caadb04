//! Row lifecycle observers.
//!
//! Every table keeps a registry of handlers per [`Hook`]. A handler is
//! registered under a [`HandlerToken`]; registering the same token again
//! replaces its handler and interest in place instead of adding a second
//! entry. Firing visits handlers in registration order and skips those not
//! interested in the mutated state.

use crate::change::Change;
use crate::model::Model;
use crate::row::Row;
use crate::table::Table;
use crate::types::State;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Points in `update_row` at which handlers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before the row is modified. The row is already unindexed.
    BeforeRowUpdate,
    /// After the row is modified and reindexed, or removed.
    AfterRowUpdate,
    /// After an absent state was set.
    CreateState,
    /// After a present state was patched.
    UpdateState,
    /// Before a present state is cleared.
    BeforeDeleteState,
    /// After a present state was cleared.
    DeleteState,
}

/// Stable identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerToken(u64);

impl HandlerToken {
    /// Creates a token from a raw value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Allocates a process-unique token.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1 << 32);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// States a handler wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    /// Desired-state mutations.
    pub desired: bool,
    /// Current-state mutations.
    pub current: bool,
}

impl Interest {
    /// Both states.
    pub const BOTH: Self = Self {
        desired: true,
        current: true,
    };
    /// Desired state only.
    pub const DESIRED: Self = Self {
        desired: true,
        current: false,
    };
    /// Current state only.
    pub const CURRENT: Self = Self {
        desired: false,
        current: true,
    };

    /// Returns true if `state` is of interest.
    pub const fn contains(self, state: State) -> bool {
        match state {
            State::Desired => self.desired,
            State::Current => self.current,
        }
    }
}

impl Default for Interest {
    fn default() -> Self {
        Self::BOTH
    }
}

impl From<State> for Interest {
    fn from(state: State) -> Self {
        match state {
            State::Desired => Self::DESIRED,
            State::Current => Self::CURRENT,
        }
    }
}

/// What a handler sees.
///
/// The model is read-only while handlers run. A handler that needs to
/// mutate the model pushes follow-up changes instead; they are applied
/// right after the triggering mutation completes, in push order.
pub struct RowEvent<'a> {
    /// The whole model, consistent with the mutation so far.
    pub model: &'a Model,
    /// Table being mutated.
    pub table: &'a Table,
    /// The row. After a removal this is the detached row.
    pub row: &'a Row,
    /// State being mutated.
    pub state: State,
    /// Hook being fired.
    pub hook: Hook,
}

/// Handler callback.
pub type Handler = Arc<dyn Fn(&RowEvent<'_>, &mut Vec<Change>) + Send + Sync>;

struct Subscription {
    token: HandlerToken,
    interest: Interest,
    handler: Handler,
}

/// Handler registry of one table.
#[derive(Default)]
pub struct Observers {
    hooks: HashMap<Hook, Vec<Subscription>>,
}

impl Observers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, or replaces the one registered under `token`.
    pub fn subscribe<F>(&mut self, hook: Hook, token: HandlerToken, interest: Interest, handler: F)
    where
        F: Fn(&RowEvent<'_>, &mut Vec<Change>) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let subs = self.hooks.entry(hook).or_default();
        match subs.iter_mut().find(|s| s.token == token) {
            Some(existing) => {
                existing.interest = interest;
                existing.handler = handler;
            }
            None => subs.push(Subscription {
                token,
                interest,
                handler,
            }),
        }
    }

    /// Changes the interest of a registered handler.
    pub fn set_interest(&mut self, hook: Hook, token: HandlerToken, interest: Interest) -> bool {
        self.hooks
            .get_mut(&hook)
            .and_then(|subs| subs.iter_mut().find(|s| s.token == token))
            .map(|s| s.interest = interest)
            .is_some()
    }

    /// Removes a handler. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, hook: Hook, token: HandlerToken) -> bool {
        let Some(subs) = self.hooks.get_mut(&hook) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.token != token);
        before != subs.len()
    }

    /// Number of handlers registered for a hook.
    pub fn count(&self, hook: Hook) -> usize {
        self.hooks.get(&hook).map_or(0, Vec::len)
    }

    /// Interest registered under a token.
    pub fn interest(&self, hook: Hook, token: HandlerToken) -> Option<Interest> {
        self.hooks
            .get(&hook)?
            .iter()
            .find(|s| s.token == token)
            .map(|s| s.interest)
    }

    pub(crate) fn interested(&self, hook: Hook, state: State) -> impl Iterator<Item = &Handler> {
        self.hooks
            .get(&hook)
            .into_iter()
            .flatten()
            .filter(move |s| s.interest.contains(state))
            .map(|s| &s.handler)
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (hook, subs) in &self.hooks {
            map.entry(hook, &subs.iter().map(|s| s.token).collect::<Vec<_>>());
        }
        map.finish()
    }
}
