//! Time source for probes, the log store and reports.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Format used for `timestamp` and `recorded_at` in log records.
///
/// Reports filter by the `YYYY-MM-DD` prefix of this string.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// A source of "now" in the monitor's configured timezone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;

    /// Current time rendered with [`TIMESTAMP_FORMAT`].
    fn now_string(&self) -> String {
        format_timestamp(&self.now())
    }
}

/// Wall clock in a fixed timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

pub fn format_timestamp(dt: &DateTime<Tz>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Clock frozen at a given instant.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Tz>);

#[cfg(test)]
impl FixedClock {
    pub fn at(tz: Tz, y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Self {
        use chrono::TimeZone;
        Self(tz.with_ymd_and_hms(y, m, d, h, min, s).unwrap())
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}
