//! Management command parsing and execution
//!
//! One command per line, whitespace separated:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `help` | list commands |
//! | `stats` | every metric as `<family>.<key>: <value>` |
//! | `counters` / `gauges` / `timers` | one family as a JSON object |
//! | `flush` | like `stats`, then reset the store |
//! | `delcounters k...` / `delgauges k...` / `deltimers k...` | queue deletes |
//! | `quit` | close the connection |

use crate::metrics::{MetricFamily, MetricsStore, Snapshot, StoreError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

pub const HELP_TEXT: &str =
    "Commands: stats, counters, timers, gauges, flush, delcounters, deltimers, delgauges, quit\n\n";
pub const END_MARKER: &str = "END\n\n";
pub const ERROR_REPLY: &str = "ERROR\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementCommand {
    Help,
    Stats,
    /// Dump one family as JSON
    Dump(MetricFamily),
    Flush,
    Delete {
        family: MetricFamily,
        keys: Vec<String>,
    },
    Quit,
    Unknown(String),
}

impl ManagementCommand {
    /// Parse one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<ManagementCommand> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let keys: Vec<String> = words.map(String::from).collect();

        let cmd = match verb {
            "help" => ManagementCommand::Help,
            "stats" => ManagementCommand::Stats,
            "counters" => ManagementCommand::Dump(MetricFamily::Counter),
            "gauges" => ManagementCommand::Dump(MetricFamily::Gauge),
            "timers" => ManagementCommand::Dump(MetricFamily::Timer),
            "flush" => ManagementCommand::Flush,
            "delcounters" => ManagementCommand::Delete {
                family: MetricFamily::Counter,
                keys,
            },
            "delgauges" => ManagementCommand::Delete {
                family: MetricFamily::Gauge,
                keys,
            },
            "deltimers" => ManagementCommand::Delete {
                family: MetricFamily::Timer,
                keys,
            },
            "quit" => ManagementCommand::Quit,
            other => ManagementCommand::Unknown(other.to_string()),
        };
        Some(cmd)
    }

    /// Run the command against the store and render its reply.
    ///
    /// Each key of a delete is queued on its own; a concurrent reader may see
    /// part of the batch applied.
    pub async fn execute(self, store: &MetricsStore) -> Result<String, StoreError> {
        let reply = match self {
            ManagementCommand::Help => HELP_TEXT.to_string(),
            ManagementCommand::Stats => render_stats(&store.read()),
            ManagementCommand::Dump(family) => render_json(&store.read(), family),
            ManagementCommand::Flush => render_stats(&store.flush()),
            ManagementCommand::Delete { family, keys } => {
                let mut out = String::new();
                for key in keys {
                    store.delete(family, key.as_str()).await?;
                    let _ = writeln!(out, "deleted: {}", key);
                }
                out.push_str(END_MARKER);
                out
            }
            ManagementCommand::Quit => String::new(),
            ManagementCommand::Unknown(_) => ERROR_REPLY.to_string(),
        };
        Ok(reply)
    }
}

fn sorted<V>(map: &std::collections::HashMap<String, V>) -> BTreeMap<&str, &V> {
    map.iter().map(|(k, v)| (k.as_str(), v)).collect()
}

/// Render every metric as `<family>.<key>: <value>` lines, sorted per family.
///
/// Values use `f64`'s `Display`, which never switches to exponent notation.
pub fn render_stats(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    for (key, value) in sorted(&snapshot.counters) {
        let _ = writeln!(out, "{}.{}: {}", MetricFamily::Counter, key, value);
    }
    for (key, value) in sorted(&snapshot.gauges) {
        let _ = writeln!(out, "{}.{}: {}", MetricFamily::Gauge, key, value);
    }
    for (key, samples) in sorted(&snapshot.timers) {
        let joined = samples
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{}.{}: [{}]", MetricFamily::Timer, key, joined);
    }
    out.push_str(END_MARKER);
    out
}

/// Render one family as a single JSON object line.
///
/// Whole numbers keep a fractional part (`4.0`).
pub fn render_json(snapshot: &Snapshot, family: MetricFamily) -> String {
    let encoded = match family {
        MetricFamily::Counter => to_json(&sorted(&snapshot.counters)),
        MetricFamily::Gauge => to_json(&sorted(&snapshot.gauges)),
        MetricFamily::Timer => to_json(&sorted(&snapshot.timers)),
    };
    format!("{}\n{}", encoded, END_MARKER)
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
