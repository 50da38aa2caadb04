//! Replay command implementation.

use serde::Serialize;
use serde_json::Value;
use sparkle_core::Model;
use sparkle_sync_engine::{Coordinator, MemoryRouter, TwilightConfig};
use sparkle_sync_protocol::Message;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Outcome of a replay.
#[derive(Debug, Serialize)]
pub struct ReplayResult {
    /// Host the messages were attributed to.
    pub host: String,
    /// Messages delivered to the session.
    pub delivered: usize,
    /// Lines that did not decode.
    pub skipped: usize,
    /// What the session did with each delivered message.
    pub outcomes: Vec<String>,
    /// Messages the session sent back.
    pub outbound: Vec<Value>,
    /// Rows in the model afterwards.
    pub rows: usize,
}

/// Runs the replay command.
pub fn run(
    messages: &Path,
    host: &str,
    snapshot: Option<&Path>,
    output: Option<&Path>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = match snapshot {
        Some(path) => super::load_model(path)?,
        None => Model::standard()?,
    };
    let text = fs::read_to_string(messages)
        .map_err(|e| format!("cannot read messages {}: {e}", messages.display()))?;

    let (result, model) = replay(model, host, &text)?;

    if let Some(path) = output {
        super::write_snapshot(&model, path)?;
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

/// Feeds newline-separated messages from `host` through a fresh session.
///
/// Returns the result and the model the session wrote to.
pub fn replay(
    model: Model,
    host: &str,
    lines: &str,
) -> Result<(ReplayResult, Model), Box<dyn std::error::Error>> {
    let router = Arc::new(MemoryRouter::new());
    let mut coordinator = Coordinator::new(
        model.into_shared(),
        router.clone(),
        TwilightConfig::new().without_keep_alive(),
    );

    let mut result = ReplayResult {
        host: host.to_string(),
        delivered: 0,
        skipped: 0,
        outcomes: Vec::new(),
        outbound: Vec::new(),
        rows: 0,
    };

    for (number, line) in lines.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message = match Message::decode(line.as_bytes()) {
            Ok(message) => message,
            Err(err) => {
                warn!(line = number + 1, %err, "skipping undecodable message");
                result.skipped += 1;
                continue;
            }
        };

        let received = coordinator.receive(host, host, &message);
        result.delivered += 1;
        result.outcomes.push(format!("{received:?}"));
        for (_, sent) in router.take() {
            result.outbound.push(sent.to_value()?);
        }
    }

    let shared = coordinator.model().clone();
    drop(coordinator);
    let model = Arc::try_unwrap(shared)
        .map_err(|_| "model still shared after replay")?
        .into_inner();
    result.rows = model.row_count();
    Ok((result, model))
}

fn print_text_output(result: &ReplayResult) {
    println!("Sparkle Replay");
    println!("==============");
    println!();
    println!("Host:      {}", result.host);
    println!("Delivered: {}", result.delivered);
    println!("Skipped:   {}", result.skipped);
    println!("Rows:      {}", result.rows);
    println!();
    println!("Outcomes:");
    for (i, outcome) in result.outcomes.iter().enumerate() {
        println!("  [{}] {}", i + 1, outcome);
    }
    if !result.outbound.is_empty() {
        println!();
        println!("Outbound:");
        for message in &result.outbound {
            println!("  {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkle_core::PrimaryKey;

    const TRAFFIC: &str = r#"
{"event": "update", "incarnation": "A", "seq": 1, "changes": []}
{"event": "update", "incarnation": "A", "seq": 0, "changes": [["host", "h1", "current", {"uuid": "h1"}], ["nic", "aa", "current", {"hwaddr": "aa"}]]}
not json
{"event": "update", "incarnation": "A", "seq": 1, "changes": [["nic", "aa", "current", null]]}
"#;

    #[test]
    fn replays_traffic() {
        let (result, model) = replay(Model::standard().unwrap(), "h1", TRAFFIC).unwrap();
        assert_eq!(result.delivered, 3);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.outcomes[0], "Desynchronized");
        assert_eq!(result.outbound, vec![serde_json::json!({"event": "resync"})]);
        assert_eq!(result.rows, 1);
        assert!(model.get("host", &PrimaryKey::from("h1")).is_some());
        assert!(model.get("nic", &PrimaryKey::from("aa")).is_none());
    }
}
