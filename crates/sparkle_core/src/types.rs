//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two facets every row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Target configuration set by operators and placement.
    Desired,
    /// Last observed configuration, reported by host agents.
    Current,
}

impl State {
    /// Both states, in canonical order.
    pub const ALL: [State; 2] = [State::Desired, State::Current];

    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            State::Desired => "desired",
            State::Current => "current",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "desired" => Some(State::Desired),
            "current" => Some(State::Current),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value kept once per state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerState<T> {
    /// Desired-state value.
    pub desired: T,
    /// Current-state value.
    pub current: T,
}

impl<T> PerState<T> {
    /// Returns the value for a state.
    pub fn get(&self, state: State) -> &T {
        match state {
            State::Desired => &self.desired,
            State::Current => &self.current,
        }
    }

    /// Returns the value for a state, mutably.
    pub fn get_mut(&mut self, state: State) -> &mut T {
        match state {
            State::Desired => &mut self.desired,
            State::Current => &mut self.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(State::Desired.as_str(), "desired");
        assert_eq!(State::parse("current"), Some(State::Current));
        assert_eq!(State::parse("pending"), None);
        assert_eq!(format!("{}", State::Current), "current");
    }

    #[test]
    fn state_serde() {
        assert_eq!(serde_json::to_string(&State::Desired).unwrap(), "\"desired\"");
        let state: State = serde_json::from_str("\"current\"").unwrap();
        assert_eq!(state, State::Current);
        assert!(serde_json::from_str::<State>("\"other\"").is_err());
    }

    #[test]
    fn per_state_access() {
        let mut counts: PerState<u32> = PerState::default();
        *counts.get_mut(State::Current) += 2;
        assert_eq!(*counts.get(State::Current), 2);
        assert_eq!(*counts.get(State::Desired), 0);
    }
}
