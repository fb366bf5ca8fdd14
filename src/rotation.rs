use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::{LogError, SinkError};

/// Length of the window after which the active file is closed and a new
/// one started. Boundaries fall on integral points of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationPeriod {
    Secondly,
    Minutely,
    Hourly,
    #[default]
    Daily,
    /// Weeks starting on the given day.
    Weekly(Weekday),
    /// Never rotate; write to the base path.
    Never,
}

impl FromStr for RotationPeriod {
    type Err = LogError;

    /// Accepts the long names (`"daily"`) and the short codes `S`, `M`, `H`,
    /// `D`, `MIDNIGHT` and `W0` (Monday) to `W6` (Sunday).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let period = match upper.as_str() {
            "S" | "SECONDLY" => RotationPeriod::Secondly,
            "M" | "MINUTELY" => RotationPeriod::Minutely,
            "H" | "HOURLY" => RotationPeriod::Hourly,
            "D" | "MIDNIGHT" | "DAILY" => RotationPeriod::Daily,
            "WEEKLY" => RotationPeriod::Weekly(Weekday::Mon),
            "NEVER" => RotationPeriod::Never,
            code if code.len() == 2 && code.starts_with('W') => {
                let day = match &code[1..] {
                    "0" => Weekday::Mon,
                    "1" => Weekday::Tue,
                    "2" => Weekday::Wed,
                    "3" => Weekday::Thu,
                    "4" => Weekday::Fri,
                    "5" => Weekday::Sat,
                    "6" => Weekday::Sun,
                    _ => return Err(LogError::Config(format!("unknown rotation period: {}", s))),
                };
                RotationPeriod::Weekly(day)
            }
            _ => return Err(LogError::Config(format!("unknown rotation period: {}", s))),
        };
        Ok(period)
    }
}

/// Timezone in which period boundaries are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationTimezone {
    #[default]
    Utc,
    Local,
    /// Fixed offset in seconds east of UTC.
    Offset(i32),
}

impl RotationTimezone {
    pub(crate) fn validate(&self) -> Result<(), LogError> {
        match self {
            RotationTimezone::Offset(secs) if FixedOffset::east_opt(*secs).is_none() => {
                Err(LogError::Config(format!("timezone offset out of range: {}s", secs)))
            }
            _ => Ok(()),
        }
    }

    fn wall_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        match self {
            RotationTimezone::Utc => now.naive_utc(),
            RotationTimezone::Local => now.with_timezone(&Local).naive_local(),
            RotationTimezone::Offset(secs) => match FixedOffset::east_opt(*secs) {
                Some(offset) => now.with_timezone(&offset).naive_local(),
                None => now.naive_utc(),
            },
        }
    }
}

/// Start of a rotation period, in the policy's wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodStart(NaiveDateTime);

impl PeriodStart {
    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for PeriodStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pure description of when files roll and what they are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationPolicy {
    pub period: RotationPeriod,
    pub timezone: RotationTimezone,
}

impl RotationPolicy {
    pub fn new(period: RotationPeriod, timezone: RotationTimezone) -> Self {
        RotationPolicy { period, timezone }
    }

    /// The period the instant `now` belongs to.
    pub fn period_for(&self, now: DateTime<Utc>) -> PeriodStart {
        let wall = self.timezone.wall_time(now);
        let at = |h: u32, m: u32, s: u32| {
            NaiveTime::from_hms_opt(h, m, s).map_or(wall, |t| wall.date().and_time(t))
        };
        let start = match self.period {
            RotationPeriod::Secondly => at(wall.hour(), wall.minute(), wall.second()),
            RotationPeriod::Minutely => at(wall.hour(), wall.minute(), 0),
            RotationPeriod::Hourly => at(wall.hour(), 0, 0),
            RotationPeriod::Daily => at(0, 0, 0),
            RotationPeriod::Weekly(first) => {
                let back = (wall.weekday().num_days_from_monday() + 7 - first.num_days_from_monday()) % 7;
                at(0, 0, 0) - Duration::days(i64::from(back))
            }
            RotationPeriod::Never => NaiveDateTime::default(),
        };
        PeriodStart(start)
    }

    /// Suffix naming a period's file, `None` when the policy never rotates.
    pub fn label(&self, start: PeriodStart) -> Option<String> {
        let pattern = match self.period {
            RotationPeriod::Secondly => "%Y-%m-%d_%H-%M-%S",
            RotationPeriod::Minutely => "%Y-%m-%d_%H-%M",
            RotationPeriod::Hourly => "%Y-%m-%d_%H",
            RotationPeriod::Daily | RotationPeriod::Weekly(_) => "%Y-%m-%d",
            RotationPeriod::Never => return None,
        };
        Some(start.0.format(pattern).to_string())
    }

    /// `<base>.<label>` for sequence 0, `<base>.<label>.<n>` otherwise.
    pub fn file_path(&self, base: &Path, start: PeriodStart, sequence: u32) -> PathBuf {
        let mut name: OsString = base.as_os_str().to_owned();
        if let Some(label) = self.label(start) {
            name.push(".");
            name.push(label);
        }
        if sequence > 0 {
            name.push(format!(".{}", sequence));
        }
        PathBuf::from(name)
    }
}

/// Mutable rotation bookkeeping, owned by the writer alone.
#[derive(Debug, Default)]
pub struct RotationState {
    pub current_file_path: Option<PathBuf>,
    pub current_period_start: Option<PeriodStart>,
    pub sequence_number: u32,
}

/// The active log file plus its rotation state.
///
/// The file is only ever touched from the writer task, so rotation is a
/// plain check-then-swap with no locking.
pub(crate) struct RollingFile {
    base: PathBuf,
    policy: RotationPolicy,
    state: RotationState,
    handle: Option<BufWriter<File>>,
}

impl RollingFile {
    pub(crate) fn new(base: PathBuf, policy: RotationPolicy) -> Self {
        RollingFile {
            base,
            policy,
            state: RotationState::default(),
            handle: None,
        }
    }

    pub(crate) fn state(&self) -> &RotationState {
        &self.state
    }

    /// Rotation only moves forward: an instant from an earlier period than
    /// the current one keeps writing to the current file.
    pub(crate) fn needs_rotation(&self, at: DateTime<Utc>) -> bool {
        match self.state.current_period_start {
            None => true,
            Some(current) => self.policy.period_for(at) > current,
        }
    }

    /// Open the file for the period of `at`. The new file is opened before
    /// the old one is closed; on failure the old handle stays active and
    /// the next write retries.
    pub(crate) async fn rotate(&mut self, at: DateTime<Utc>) -> Result<PathBuf, SinkError> {
        let period = self.policy.period_for(at);
        let (path, sequence) = self.next_free_path(period).await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|source| SinkError::Rotation {
                path: path.clone(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| SinkError::Rotation {
                path: path.clone(),
                source,
            })?;

        let previous = self.handle.replace(BufWriter::new(file));
        let previous_path = self.state.current_file_path.replace(path.clone());
        self.state.current_period_start = Some(period);
        self.state.sequence_number = sequence;

        if let Some(mut old) = previous {
            if let Err(source) = old.shutdown().await {
                return Err(SinkError::Flush {
                    path: previous_path.unwrap_or_default(),
                    source,
                });
            }
        }
        Ok(path)
    }

    async fn next_free_path(&self, period: PeriodStart) -> (PathBuf, u32) {
        if self.policy.period == RotationPeriod::Never {
            return (self.policy.file_path(&self.base, period, 0), 0);
        }
        let mut sequence = 0;
        loop {
            let candidate = self.policy.file_path(&self.base, period, sequence);
            match fs::try_exists(&candidate).await {
                Ok(true) => sequence += 1,
                _ => return (candidate, sequence),
            }
        }
    }

    /// Append one line. The line and its newline go out in a single write
    /// so a record never straddles two files.
    pub(crate) async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let path = self.state.current_file_path.clone().unwrap_or_default();
        let handle = self.handle.as_mut().ok_or(SinkError::NoActiveFile)?;
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        handle
            .write_all(&bytes)
            .await
            .map_err(|source| SinkError::Write { path, source })
    }

    pub(crate) async fn flush(&mut self) -> Result<(), SinkError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        handle.flush().await.map_err(|source| SinkError::Flush {
            path: self.state.current_file_path.clone().unwrap_or_default(),
            source,
        })
    }

    /// Flush and release the handle. Later writes fail with
    /// [`SinkError::NoActiveFile`].
    pub(crate) async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        handle.shutdown().await.map_err(|source| SinkError::Flush {
            path: self.state.current_file_path.clone().unwrap_or_default(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn parses_long_names_and_short_codes() {
        assert_eq!("daily".parse::<RotationPeriod>().unwrap(), RotationPeriod::Daily);
        assert_eq!("MIDNIGHT".parse::<RotationPeriod>().unwrap(), RotationPeriod::Daily);
        assert_eq!("h".parse::<RotationPeriod>().unwrap(), RotationPeriod::Hourly);
        assert_eq!("W0".parse::<RotationPeriod>().unwrap(), RotationPeriod::Weekly(Weekday::Mon));
        assert_eq!("W6".parse::<RotationPeriod>().unwrap(), RotationPeriod::Weekly(Weekday::Sun));
        assert!("W7".parse::<RotationPeriod>().is_err());
        assert!("fortnightly".parse::<RotationPeriod>().is_err());
    }

    #[test]
    fn daily_periods_change_at_midnight() {
        let policy = RotationPolicy::default();
        let before = policy.period_for(utc(2024, 3, 1, 23, 59, 59));
        let after = policy.period_for(utc(2024, 3, 2, 0, 0, 0));
        assert_ne!(before, after);
        assert_eq!(policy.label(before).unwrap(), "2024-03-01");
        assert_eq!(policy.label(after).unwrap(), "2024-03-02");
        assert_eq!(policy.period_for(utc(2024, 3, 1, 0, 0, 0)), before);
    }

    #[test]
    fn hourly_and_minutely_labels() {
        let hourly = RotationPolicy::new(RotationPeriod::Hourly, RotationTimezone::Utc);
        let minutely = RotationPolicy::new(RotationPeriod::Minutely, RotationTimezone::Utc);
        let at = utc(2024, 3, 1, 14, 37, 12);
        assert_eq!(hourly.label(hourly.period_for(at)).unwrap(), "2024-03-01_14");
        assert_eq!(minutely.label(minutely.period_for(at)).unwrap(), "2024-03-01_14-37");
    }

    #[test]
    fn offset_moves_the_day_boundary() {
        let tokyo = RotationPolicy::new(RotationPeriod::Daily, RotationTimezone::Offset(9 * 3600));
        // 15:30 UTC is already the next day at +09:00.
        let start = tokyo.period_for(utc(2024, 3, 1, 15, 30, 0));
        assert_eq!(tokyo.label(start).unwrap(), "2024-03-02");
    }

    #[test]
    fn weekly_periods_start_on_configured_day() {
        let policy = RotationPolicy::new(RotationPeriod::Weekly(Weekday::Mon), RotationTimezone::Utc);
        // 2024-03-07 is a Thursday; its week started on Monday 2024-03-04.
        let start = policy.period_for(utc(2024, 3, 7, 10, 0, 0));
        assert_eq!(policy.label(start).unwrap(), "2024-03-04");
        assert_eq!(policy.period_for(utc(2024, 3, 10, 23, 59, 59)), start);
        assert_ne!(policy.period_for(utc(2024, 3, 11, 0, 0, 0)), start);
    }

    #[test]
    fn file_path_appends_label_and_sequence() {
        let policy = RotationPolicy::default();
        let start = policy.period_for(utc(2024, 3, 1, 8, 0, 0));
        let base = Path::new("/var/log/app.log");
        assert_eq!(policy.file_path(base, start, 0), PathBuf::from("/var/log/app.log.2024-03-01"));
        assert_eq!(policy.file_path(base, start, 2), PathBuf::from("/var/log/app.log.2024-03-01.2"));

        let never = RotationPolicy::new(RotationPeriod::Never, RotationTimezone::Utc);
        assert_eq!(never.file_path(base, never.period_for(Utc::now()), 0), PathBuf::from(base));
    }

    #[test]
    fn offset_validation() {
        assert!(RotationTimezone::Offset(3600).validate().is_ok());
        assert!(RotationTimezone::Offset(90_000).validate().is_err());
    }

    #[tokio::test]
    async fn rotate_skips_paths_left_by_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        let at = utc(2024, 3, 1, 8, 0, 0);
        std::fs::write(dir.path().join("app.log.2024-03-01"), "old run\n").unwrap();

        let mut file = RollingFile::new(base, RotationPolicy::default());
        let path = file.rotate(at).await.unwrap();
        assert_eq!(path, dir.path().join("app.log.2024-03-01.1"));
        assert_eq!(file.state().sequence_number, 1);

        file.write_line("fresh").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("app.log.2024-03-01")).unwrap(),
            "old run\n"
        );
    }

    #[tokio::test]
    async fn rotation_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::new(dir.path().join("app.log"), RotationPolicy::default());
        file.rotate(utc(2024, 3, 2, 0, 0, 1)).await.unwrap();

        assert!(!file.needs_rotation(utc(2024, 3, 1, 23, 59, 59)));
        assert!(!file.needs_rotation(utc(2024, 3, 2, 18, 0, 0)));
        assert!(file.needs_rotation(utc(2024, 3, 3, 0, 0, 0)));
    }

    #[tokio::test]
    async fn write_after_close_reports_no_active_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = RollingFile::new(dir.path().join("app.log"), RotationPolicy::default());
        file.rotate(Utc::now()).await.unwrap();
        file.close().await.unwrap();
        assert!(matches!(file.write_line("late").await, Err(SinkError::NoActiveFile)));
    }
}
