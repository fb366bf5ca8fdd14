use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Source of record timestamps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that follows the system time, including NTP corrections and
/// time spent suspended, but never hands out an instant earlier than one
/// it already returned. A clock stepped backwards holds at the last value
/// until real time catches up.
#[derive(Debug)]
pub struct SystemClock {
    last: Mutex<DateTime<Utc>>,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        *last = (*last).max(Utc::now());
        *last
    }
}

/// Clock that only moves when told to. Used to simulate period boundaries.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= last);
            last = next;
        }
    }

    #[test]
    fn system_clock_follows_wall_time() {
        let clock = SystemClock::new();
        let before = Utc::now();
        let seen = clock.now();
        let after = Utc::now();
        assert!(seen >= before && seen <= after);
    }

    #[test]
    fn system_clock_holds_when_time_steps_back() {
        let clock = SystemClock::new();
        let ahead = Utc::now() + Duration::hours(1);
        *clock.last.lock() = ahead;
        assert_eq!(clock.now(), ahead);
    }

    #[test]
    fn manual_clock_moves_only_on_request() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap());
    }
}
