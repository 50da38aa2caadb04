//! Property-based test generators using proptest.
//!
//! Keys and field values are drawn from small domains so that generated
//! changes collide on the same rows and index buckets often.

use proptest::prelude::*;
use serde_json::{json, Value};
use sparkle_core::{Change, Part, PrimaryKey, State};

/// Strategy for a state.
pub fn state_strategy() -> impl Strategy<Value = State> {
    prop_oneof![Just(State::Desired), Just(State::Current)]
}

/// Strategy for a short key from a domain of `size` values.
pub fn key_strategy(prefix: &'static str, size: u32) -> impl Strategy<Value = String> {
    (0..size).prop_map(move |n| format!("{prefix}{n}"))
}

/// Strategy for field values: mostly small scalars, sometimes a float or
/// a list.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => (0..4i64).prop_map(Value::from),
        4 => key_strategy("v", 4).prop_map(Value::from),
        1 => Just(Value::Null),
        1 => Just(json!(0.5)),
        1 => prop::collection::vec(0..3i64, 0..3).prop_map(|v| json!(v)),
    ]
}

/// Strategy for a part containing some of `columns`.
pub fn part_strategy(columns: &'static [&'static str]) -> impl Strategy<Value = Part> {
    prop::collection::vec(
        (prop::sample::select(columns), field_value_strategy()),
        0..columns.len() + 1,
    )
    .prop_map(|fields| {
        fields
            .into_iter()
            .map(|(column, value)| (column.to_string(), value))
            .collect()
    })
}

/// Strategy for changes to a single-key table.
///
/// About one change in four deletes its state.
pub fn change_strategy(
    table: &'static str,
    key_size: u32,
    columns: &'static [&'static str],
) -> impl Strategy<Value = Change> {
    (
        key_strategy("k", key_size),
        state_strategy(),
        prop::option::weighted(0.75, part_strategy(columns)),
    )
        .prop_map(move |(key, state, part)| Change::new(table, key, state, part))
}

/// Strategy for changes to a join table keyed by `(left, right)`.
///
/// Parts always carry both key columns. Key values are drawn from the
/// `l`/`r` domains of `size` values each.
pub fn join_change_strategy(
    table: &'static str,
    left: &'static str,
    right: &'static str,
    size: u32,
) -> impl Strategy<Value = Change> {
    (
        key_strategy("l", size),
        key_strategy("r", size),
        state_strategy(),
        any::<bool>(),
    )
        .prop_map(move |(l, r, state, delete)| {
            let pkey = PrimaryKey::composite([l.as_str(), r.as_str()]);
            let part = (!delete).then(|| {
                let mut part = Part::new();
                part.insert(left.to_string(), Value::from(l));
                part.insert(right.to_string(), Value::from(r));
                part
            });
            Change::new(table, pkey, state, part)
        })
}

/// Strategy for a batch of changes.
pub fn batch_strategy<S>(change: S, max_len: usize) -> impl Strategy<Value = Vec<Change>>
where
    S: Strategy<Value = Change>,
{
    prop::collection::vec(change, 0..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn parts_use_declared_columns(part in part_strategy(&["a", "b"])) {
            prop_assert!(part.keys().all(|k| k == "a" || k == "b"));
        }

        #[test]
        fn join_parts_carry_their_key(change in join_change_strategy("host_volume", "host", "volume", 3)) {
            if let Some(part) = &change.part {
                let key = PrimaryKey::composite([
                    part["host"].as_str().unwrap(),
                    part["volume"].as_str().unwrap(),
                ]);
                prop_assert_eq!(key, change.pkey);
            }
        }
    }
}
