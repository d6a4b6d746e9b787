use chrono::{DateTime, NaiveDateTime, TimeDelta};
use std::time::Instant;
use tracing::info;

/// Logs how long a command took when dropped.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        info!("▶ {}", label);
        Self {
            label,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("■ {} finished in {:.2?}", self.label, self.start.elapsed());
    }
}

/// `1234567` → `"1,234,567"`.
pub fn fmt_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    let sign = if n < 0 { "-" } else { "" };
    format!("{}{}", sign, groups.join(","))
}

/// Start of a `days`-long window ending at `now`. Windows reaching past the
/// Unix epoch start at the epoch.
pub fn days_before(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    let epoch = DateTime::UNIX_EPOCH.naive_utc();
    TimeDelta::try_days(i64::from(days))
        .and_then(|span| now.checked_sub_signed(span))
        .map_or(epoch, |start| start.max(epoch))
}

pub fn fmt_timestamp(ts: Option<NaiveDateTime>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "—".into())
}
