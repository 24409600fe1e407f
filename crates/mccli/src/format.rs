//! Output formatter
//!
//! Every invocation yields exactly one [`OutputRecord`]. [`render`] turns a
//! record into text: human templates per [`ResultShape`], or one compact
//! JSON object per record in machine mode (never an aggregate array, so a
//! chain streams one line per invocation).

use chrono::{Local, TimeZone};
use serde_json::{json, Map, Value};

use crate::error::CommandError;
use crate::registry::ResultShape;
use crate::wait::WaitSlot;

/// Run-wide rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Human,
    Json,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(Value),
    TimedOut(WaitSlot),
    Failed(CommandError),
}

/// The result of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// Canonical command name, or the offending token for parse errors.
    pub command: String,
    pub shape: ResultShape,
    pub outcome: Outcome,
    /// Render structured whatever the run mode.
    pub structured: bool,
}

impl OutputRecord {
    pub fn done(command: impl Into<String>, shape: ResultShape, value: Value) -> Self {
        OutputRecord {
            command: command.into(),
            shape,
            outcome: Outcome::Done(value),
            structured: false,
        }
    }

    pub fn failed(command: impl Into<String>, error: CommandError) -> Self {
        OutputRecord {
            command: command.into(),
            shape: ResultShape::Unit,
            outcome: Outcome::Failed(error),
            structured: false,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Done(_))
    }

    /// Whether this record ended the rest of its chain.
    pub fn is_fatal(&self) -> bool {
        matches!(&self.outcome, Outcome::Failed(e) if e.is_fatal())
    }

    /// Machine-readable envelope.
    pub fn to_json(&self) -> Value {
        let mut envelope = Map::new();
        envelope.insert("command".into(), json!(self.command));
        match &self.outcome {
            Outcome::Done(value) => {
                envelope.insert("status".into(), json!("ok"));
                envelope.insert("result".into(), value.clone());
            }
            Outcome::TimedOut(slot) => {
                envelope.insert("status".into(), json!("timeout"));
                envelope.insert("wait".into(), json!(slot));
            }
            Outcome::Failed(error) => {
                envelope.insert("status".into(), json!("error"));
                envelope.insert("kind".into(), json!(error.kind()));
                envelope.insert("error".into(), json!(error.to_string()));
            }
        }
        Value::Object(envelope)
    }
}

/// Render one record. The record's own marker overrides a human run mode.
pub fn render(record: &OutputRecord, mode: OutputMode) -> String {
    if mode == OutputMode::Json || record.structured {
        return record.to_json().to_string();
    }

    match &record.outcome {
        Outcome::Done(value) => render_human(record.shape, value),
        Outcome::TimedOut(slot) => format!("{}: timeout waiting for {}", record.command, slot),
        Outcome::Failed(error) => format!("{}: {}", record.command, error),
    }
}

fn render_human(shape: ResultShape, value: &Value) -> String {
    let rendered = match shape {
        ResultShape::Unit => Some("ok".to_string()),
        ResultShape::Scalar => Some(scalar(value)),
        ResultShape::Clock => value
            .as_i64()
            .or_else(|| value.get("time").and_then(Value::as_i64))
            .map(clock_line)
            .or_else(|| value.is_null().then(|| "ok".to_string())),
        ResultShape::Record => value.as_object().map(record_lines),
        ResultShape::Contacts => value.as_array().map(|rows| contact_rows(rows)),
        ResultShape::Channels => value.as_array().map(|rows| channel_rows(rows)),
        ResultShape::Messages => message_lines(value),
    };
    rendered.unwrap_or_else(|| serde_json::to_string_pretty(value).unwrap_or_default())
}

/// `Current time : 2024-05-01 13:37:00 (1714570620)`
pub fn clock_line(epoch: i64) -> String {
    let date = Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("Current time : {} ({})", date, epoch)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn record_lines(fields: &Map<String, Value>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}: {}", k, scalar(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

fn contact_rows(rows: &[Value]) -> String {
    if rows.is_empty() {
        return "no contacts".to_string();
    }
    rows.iter()
        .map(|row| {
            let key = field(row, "public_key");
            format!(
                "{:<20} {:<4} {:<12} {}",
                field(row, "name"),
                field(row, "type"),
                &key[..key.len().min(12)],
                field(row, "path"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn channel_rows(rows: &[Value]) -> String {
    if rows.is_empty() {
        return "no channels".to_string();
    }
    rows.iter()
        .map(|row| format!("{}: {}", row.get("index").map(scalar).unwrap_or_default(), field(row, "name")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[alice] hello` for contact messages, `[#public] bob: hi` for channels.
pub fn message_line(message: &Value) -> String {
    let origin = match field(message, "type") {
        "channel" => {
            let name = field(message, "channel");
            if name.is_empty() {
                format!("ch{}", message.get("channel_idx").map(scalar).unwrap_or_default())
            } else {
                format!("#{}", name.trim_start_matches('#'))
            }
        }
        _ => field(message, "from").to_string(),
    };
    format!("[{}] {}", origin, field(message, "text"))
}

fn message_lines(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("no more messages".to_string()),
        Value::Array(messages) if messages.is_empty() => Some("no more messages".to_string()),
        Value::Array(messages) => Some(messages.iter().map(message_line).collect::<Vec<_>>().join("\n")),
        Value::Object(_) => Some(message_line(value)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;

    #[test]
    fn test_clock_template() {
        let record = OutputRecord::done("clock", ResultShape::Clock, json!(1_714_570_620));
        let text = render(&record, OutputMode::Human);
        assert!(text.starts_with("Current time : "));
        assert!(text.ends_with("(1714570620)"));
        let expected = Local.timestamp_opt(1_714_570_620, 0).unwrap().format("%Y-%m-%d %H:%M:%S").to_string();
        assert!(text.contains(&expected));
    }

    #[test]
    fn test_json_envelopes() {
        let ok = OutputRecord::done("get_bat", ResultShape::Record, json!({"battery_mv": 4100}));
        let timeout = OutputRecord {
            command: "wait_ack".into(),
            shape: ResultShape::Record,
            outcome: Outcome::TimedOut(WaitSlot::Ack),
            structured: false,
        };
        let failed = OutputRecord::failed("msg", CommandError::Unresolved("unknown contact 'zed'".into()));

        let lines: Vec<Value> = [ok, timeout, failed]
            .iter()
            .map(|r| serde_json::from_str(&render(r, OutputMode::Json)).unwrap())
            .collect();

        assert_eq!(lines[0], json!({"command": "get_bat", "status": "ok", "result": {"battery_mv": 4100}}));
        assert_eq!(lines[1], json!({"command": "wait_ack", "status": "timeout", "wait": "ack"}));
        assert_eq!(lines[2]["status"], "error");
        assert_eq!(lines[2]["kind"], "unresolved");
    }

    #[test]
    fn test_json_is_one_line() {
        let record = OutputRecord::done("infos", ResultShape::Record, json!({"name": "n", "nested": {"a": [1, 2]}}));
        assert!(!render(&record, OutputMode::Json).contains('\n'));
    }

    #[test]
    fn test_structured_marker_overrides_human_mode() {
        let mut record = OutputRecord::done("clock", ResultShape::Clock, json!(5));
        record.structured = true;
        assert!(render(&record, OutputMode::Human).starts_with('{'));
    }

    #[test]
    fn test_human_failures_and_timeouts() {
        let failed = OutputRecord::failed("infos", CommandError::Transport(SessionError::Closed));
        assert_eq!(render(&failed, OutputMode::Human), "infos: transport error: connection closed");

        let timeout = OutputRecord {
            command: "wait_login".into(),
            shape: ResultShape::Record,
            outcome: Outcome::TimedOut(WaitSlot::Login),
            structured: false,
        };
        assert_eq!(render(&timeout, OutputMode::Human), "wait_login: timeout waiting for login");
    }

    #[test]
    fn test_messages() {
        let value = json!([
            {"type": "contact", "from": "alice", "text": "hi"},
            {"type": "channel", "channel": "Public", "channel_idx": 0, "text": "bob: yo"},
            {"type": "channel", "channel": "", "channel_idx": 4, "text": "x"},
        ]);
        let record = OutputRecord::done("sync_msgs", ResultShape::Messages, value);
        assert_eq!(render(&record, OutputMode::Human), "[alice] hi\n[#Public] bob: yo\n[ch4] x");

        let empty = OutputRecord::done("recv", ResultShape::Messages, Value::Null);
        assert_eq!(render(&empty, OutputMode::Human), "no more messages");
    }

    #[test]
    fn test_record_and_fallback() {
        let record = OutputRecord::done("query", ResultShape::Record, json!({"model": "T-Echo", "max_contacts": 350}));
        assert_eq!(render(&record, OutputMode::Human), "max_contacts: 350\nmodel: T-Echo");

        // A non-object record falls back to pretty JSON
        let odd = OutputRecord::done("query", ResultShape::Record, json!([1, 2]));
        assert!(render(&odd, OutputMode::Human).contains("\n"));
    }
}
