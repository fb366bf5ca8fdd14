use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LogError;

/// Severity of a record. Variants are declared in ascending order so the
/// derived `Ord` gives `Debug < Info < Warning < Error < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Conventional numeric severity (10, 20, 30, 40, 50).
    pub fn as_number(&self) -> u8 {
        match self {
            Level::Debug => 10,
            Level::Info => 20,
            Level::Warning => 30,
            Level::Error => 40,
            Level::Critical => 50,
        }
    }

    pub fn from_number(value: i64) -> Result<Self, LogError> {
        match value {
            10 => Ok(Level::Debug),
            20 => Ok(Level::Info),
            30 => Ok(Level::Warning),
            40 => Ok(Level::Error),
            50 => Ok(Level::Critical),
            other => Err(LogError::InvalidLevel(other.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return Level::from_number(number);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" | "WARN" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            _ => Err(LogError::InvalidLevel(s.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Number(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Level::from_number(n).map_err(serde::de::Error::custom),
        }
    }
}

/// Anything a caller may hand over as a level: a [`Level`], a name such as
/// `"warning"`, or a numeric severity.
pub trait IntoLevel {
    fn into_level(self) -> Result<Level, LogError>;
}

impl IntoLevel for Level {
    fn into_level(self) -> Result<Level, LogError> {
        Ok(self)
    }
}

impl IntoLevel for &str {
    fn into_level(self) -> Result<Level, LogError> {
        self.parse()
    }
}

impl IntoLevel for String {
    fn into_level(self) -> Result<Level, LogError> {
        self.parse()
    }
}

impl IntoLevel for i64 {
    fn into_level(self) -> Result<Level, LogError> {
        Level::from_number(self)
    }
}

impl IntoLevel for i32 {
    fn into_level(self) -> Result<Level, LogError> {
        Level::from_number(i64::from(self))
    }
}

#[cfg(feature = "tracing-layer")]
impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
    }

    #[test]
    fn parses_names_aliases_and_numbers() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("fatal".parse::<Level>().unwrap(), Level::Critical);
        assert_eq!("40".parse::<Level>().unwrap(), Level::Error);
        assert_eq!(10i64.into_level().unwrap(), Level::Debug);
    }

    #[test]
    fn rejects_unknown_levels() {
        assert!(matches!("verbose".parse::<Level>(), Err(LogError::InvalidLevel(_))));
        assert!(matches!(Level::from_number(25), Err(LogError::InvalidLevel(_))));
    }

    #[test]
    fn deserializes_from_name_or_number() {
        let by_name: Level = serde_json::from_str("\"error\"").unwrap();
        let by_number: Level = serde_json::from_str("30").unwrap();
        assert_eq!(by_name, Level::Error);
        assert_eq!(by_number, Level::Warning);
        assert!(serde_json::from_str::<Level>("\"loud\"").is_err());
    }
}
