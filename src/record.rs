use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::LogError;
use crate::level::{IntoLevel, Level};

/// Structured key/value payload carried by a record.
pub type Fields = BTreeMap<String, Value>;

/// One log event. Fields are private so a record cannot change after it
/// has been built; the builder-style `with_*` methods consume it.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    timestamp: DateTime<Utc>,
    level: Level,
    message: String,
    fields: Fields,
    exception: Option<ExceptionInfo>,
    logger: Option<String>,
    callsite: Option<Callsite>,
}

impl Record {
    /// Build a record stamped with the current time.
    ///
    /// Fails with [`LogError::InvalidLevel`] when `level` is a name or
    /// number that does not map to a [`Level`].
    pub fn new(
        level: impl IntoLevel,
        message: impl Into<String>,
        fields: impl IntoFields,
        exception: Option<ExceptionInfo>,
    ) -> Result<Self, LogError> {
        let level = level.into_level()?;
        Ok(Self::at(Utc::now(), level, message, fields, exception))
    }

    /// Build a record with an explicit timestamp.
    pub fn at(
        timestamp: DateTime<Utc>,
        level: Level,
        message: impl Into<String>,
        fields: impl IntoFields,
        exception: Option<ExceptionInfo>,
    ) -> Self {
        Record {
            timestamp,
            level,
            message: message.into(),
            fields: fields.into_fields(),
            exception,
            logger: None,
            callsite: None,
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_callsite(mut self, callsite: Callsite) -> Self {
        self.callsite = Some(callsite);
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn exception(&self) -> Option<&ExceptionInfo> {
        self.exception.as_ref()
    }

    pub fn logger(&self) -> Option<&str> {
        self.logger.as_deref()
    }

    pub fn callsite(&self) -> Option<&Callsite> {
        self.callsite.as_ref()
    }
}

/// Error captured alongside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionInfo {
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: String,
    pub trace: Option<String>,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        ExceptionInfo {
            type_name: type_name.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// Capture an error, its `source()` chain and, when backtraces are
    /// enabled through `RUST_BACKTRACE`, the current backtrace.
    pub fn capture<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let mut trace = String::new();
        let mut source = error.source();
        while let Some(cause) = source {
            trace.push_str("caused by: ");
            trace.push_str(&cause.to_string());
            trace.push('\n');
            source = cause.source();
        }

        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            trace.push_str(&backtrace.to_string());
        }

        ExceptionInfo {
            type_name: std::any::type_name::<E>().to_string(),
            message: error.to_string(),
            trace: (!trace.is_empty()).then(|| trace.trim_end().to_string()),
        }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)?;
        if let Some(trace) = &self.trace {
            write!(f, "\n{}", trace)?;
        }
        Ok(())
    }
}

/// Where a record was emitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Callsite {
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Callsite {
    pub fn from_location(target: impl Into<String>, location: &Location<'_>) -> Self {
        Callsite {
            target: target.into(),
            module_path: None,
            file: Some(location.file().to_string()),
            line: Some(location.line()),
        }
    }
}

impl fmt::Display for Callsite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}", file, line),
            (Some(file), None) => f.write_str(file),
            _ => f.write_str(&self.target),
        }
    }
}

/// Convert any value into a field value.
///
/// Values that cannot be represented as JSON (maps with non-string keys,
/// failing `Serialize` impls) fall back to their `Debug` text.
pub fn value<T: Serialize + fmt::Debug + ?Sized>(v: &T) -> Value {
    serde_json::to_value(v).unwrap_or_else(|_| Value::String(format!("{:?}", v)))
}

/// Types accepted wherever a call site passes fields.
pub trait IntoFields {
    fn into_fields(self) -> Fields;
}

impl IntoFields for () {
    fn into_fields(self) -> Fields {
        Fields::new()
    }
}

impl IntoFields for Fields {
    fn into_fields(self) -> Fields {
        self
    }
}

impl IntoFields for serde_json::Map<String, Value> {
    fn into_fields(self) -> Fields {
        self.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoFields for [(K, V); N] {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoFields for Vec<(K, V)> {
    fn into_fields(self) -> Fields {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

/// Build a [`Fields`] map from `key => value` pairs of mixed types.
///
/// ```
/// let fields = rolling_log_sink::fields! { "user_id" => 42, "reason" => "bad password" };
/// assert_eq!(fields.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::record::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::record::Fields::new();
        $(
            map.insert(::std::string::String::from($key), $crate::record::value(&$value));
        )+
        map
    }};
}
