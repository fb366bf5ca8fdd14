use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::{value, Record};

/// Output layout for a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatMode {
    /// One JSON object per line with fields flattened at the top level.
    #[default]
    Json,
    /// `<timestamp> [<LEVEL>] <message> k=v ...`
    Plain,
}

/// Prefix applied to a field key that collides with a key the formatter
/// writes itself.
pub const FIELD_PREFIX: &str = "field_";

/// Render `record` as a single line, without the trailing newline.
pub fn format(record: &Record, mode: FormatMode) -> String {
    Formatter::new(mode).format(record)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter {
    pub mode: FormatMode,
    pub include_callsite: bool,
}

impl Formatter {
    pub fn new(mode: FormatMode) -> Self {
        Formatter {
            mode,
            include_callsite: false,
        }
    }

    pub fn with_callsite(mut self, include: bool) -> Self {
        self.include_callsite = include;
        self
    }

    /// Formatting never fails: JSON output degrades to the plain layout if
    /// serialization ever errors.
    pub fn format(&self, record: &Record) -> String {
        match self.mode {
            FormatMode::Json => {
                serde_json::to_string(&self.json_object(record)).unwrap_or_else(|_| self.plain(record))
            }
            FormatMode::Plain => self.plain(record),
        }
    }

    fn json_object(&self, record: &Record) -> Value {
        let mut obj = Map::new();
        obj.insert("timestamp".into(), Value::String(timestamp_text(record.timestamp())));
        obj.insert("level".into(), Value::String(record.level().as_str().into()));
        obj.insert("message".into(), Value::String(record.message().into()));
        if let Some(logger) = record.logger() {
            obj.insert("logger".into(), Value::String(logger.into()));
        }
        if self.include_callsite {
            if let Some(callsite) = record.callsite() {
                obj.insert("callsite".into(), Value::String(callsite.to_string()));
            }
        }
        if let Some(exception) = record.exception() {
            obj.insert("exception".into(), value(exception));
        }

        for (key, v) in record.fields() {
            let mut key = key.clone();
            while obj.contains_key(&key) {
                key = format!("{}{}", FIELD_PREFIX, key);
            }
            obj.insert(key, v.clone());
        }

        Value::Object(obj)
    }

    fn plain(&self, record: &Record) -> String {
        let mut line = format!(
            "{} [{}] {}",
            timestamp_text(record.timestamp()),
            record.level(),
            escape_newlines(record.message())
        );

        if let Some(logger) = record.logger() {
            push_pair(&mut line, "logger", &plain_text(logger));
        }
        for (key, v) in record.fields() {
            push_pair(&mut line, key, &plain_value(v));
        }
        if self.include_callsite {
            if let Some(callsite) = record.callsite() {
                push_pair(&mut line, "callsite", &plain_text(&callsite.to_string()));
            }
        }
        if let Some(exception) = record.exception() {
            push_pair(&mut line, "exception", &quoted(&exception.to_string()));
        }
        line
    }
}

/// RFC 3339 in UTC with as many fractional digits as the instant needs, so
/// parsing the text back yields the same instant.
pub fn timestamp_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn push_pair(line: &mut String, key: &str, rendered: &str) {
    line.push(' ');
    line.push_str(&plain_text(key));
    line.push('=');
    line.push_str(rendered);
}

fn plain_value(v: &Value) -> String {
    match v {
        Value::String(s) => plain_text(s),
        other => other.to_string(),
    }
}

fn plain_text(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '=' || c.is_control());
    if needs_quotes {
        quoted(s)
    } else {
        s.to_string()
    }
}

fn quoted(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn escape_newlines(s: &str) -> String {
    if !s.contains(['\n', '\r']) {
        return s.to_string();
    }
    s.replace('\r', "\\r").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::record::{Callsite, ExceptionInfo, Fields};
    use chrono::TimeZone;

    fn sample(fields: Fields) -> Record {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        Record::at(ts, Level::Info, "started", fields, None)
    }

    #[test]
    fn json_round_trips_core_keys_and_fields() {
        let record = sample(crate::fields! { "version" => "1.0.0", "workers" => 4, "ok" => true });
        let line = format(&record, FormatMode::Json);
        let parsed: Value = serde_json::from_str(&line).unwrap();

        let ts = DateTime::parse_from_rfc3339(parsed["timestamp"].as_str().unwrap()).unwrap();
        assert_eq!(ts.with_timezone(&Utc), record.timestamp());
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "started");
        assert_eq!(parsed["version"], "1.0.0");
        assert_eq!(parsed["workers"], 4);
        assert_eq!(parsed["ok"], true);
    }

    #[test]
    fn json_prefixes_colliding_field_keys() {
        let record = sample(crate::fields! {
            "level" => "custom",
            "field_level" => "already taken",
            "message" => "shadow",
        });
        let parsed: Value = serde_json::from_str(&format(&record, FormatMode::Json)).unwrap();

        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "started");
        assert_eq!(parsed["field_message"], "shadow");
        assert_eq!(parsed["field_level"], "already taken");
        assert_eq!(parsed["field_field_level"], "custom");
    }

    #[test]
    fn json_is_a_single_line_even_with_newlines() {
        let record = Record::at(Utc::now(), Level::Error, "line one\nline two", (), None);
        let line = format(&record, FormatMode::Json);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn json_includes_exception_and_logger() {
        let record = Record::at(
            Utc::now(),
            Level::Error,
            "Calculation failed",
            (),
            Some(ExceptionInfo::new("ZeroDivision", "division by zero")),
        )
        .with_logger("structlog_native")
        .with_callsite(Callsite {
            target: "app".into(),
            module_path: None,
            file: Some("src/main.rs".into()),
            line: Some(7),
        });

        let parsed: Value = serde_json::from_str(&format(&record, FormatMode::Json)).unwrap();
        assert_eq!(parsed["logger"], "structlog_native");
        assert_eq!(parsed["exception"]["type"], "ZeroDivision");
        assert_eq!(parsed["exception"]["message"], "division by zero");
        assert!(parsed.get("callsite").is_none());
    }

    #[test]
    fn callsite_only_when_enabled() {
        let record = sample(Fields::new()).with_callsite(Callsite {
            target: "app".into(),
            module_path: None,
            file: Some("src/main.rs".into()),
            line: Some(7),
        });
        let line = Formatter::new(FormatMode::Json).with_callsite(true).format(&record);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["callsite"], "src/main.rs:7");
    }

    #[test]
    fn plain_layout() {
        let record = sample(crate::fields! { "user" => "abc-123", "note" => "two words", "n" => 2 });
        let line = format(&record, FormatMode::Plain);
        assert_eq!(
            line,
            "2024-05-17T08:30:00.123456789Z [INFO] started n=2 note=\"two words\" user=abc-123"
        );
    }

    #[test]
    fn plain_escapes_newlines_in_message_and_exception() {
        let record = Record::at(
            Utc::now(),
            Level::Critical,
            "boom\nagain",
            (),
            Some(ExceptionInfo {
                type_name: "Io".into(),
                message: "gone".into(),
                trace: Some("frame 1\nframe 2".into()),
            }),
        );
        let line = format(&record, FormatMode::Plain);
        assert!(!line.contains('\n'));
        assert!(line.contains("boom\\nagain"));
        assert!(line.contains("exception=\"Io: gone\\nframe 1\\nframe 2\""));
    }

    #[test]
    fn plain_quotes_awkward_field_keys() {
        let record = sample(crate::fields! { "evil\nkey" => 1, "a b=c" => "x" });
        let line = format(&record, FormatMode::Plain);
        assert!(!line.contains('\n'));
        assert_eq!(
            line,
            "2024-05-17T08:30:00.123456789Z [INFO] started \"a b=c\"=x \"evil\\nkey\"=1"
        );
    }
}
