//! Hourly per-(chat, user) rate limiting.
//!
//! One counter per UTC hour bucket, incremented by a server-side script so
//! the TTL is set exactly once. Every call consumes a slot whether or not
//! it is allowed; denied traffic still pays.

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use redis::aio::ConnectionManager;
use redis::Script;

use crate::error::Result;

const INCR_WITH_TTL: &str = r#"
local c = redis.call("INCR", KEYS[1])
if c == 1 then
  redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return c
"#;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub used: i64,
    pub reset_at: DateTime<Utc>,
}

/// Hour-bucketed counter with a global per-hour limit.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    limit: i64,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager, limit: i64) -> Self {
        Self { conn, limit }
    }

    /// Count one request for `(chat, user)` in the hour bucket containing
    /// `now` and report whether it fits the limit. Callers treat errors as
    /// fail-open.
    pub async fn allow(&self, chat_id: i64, user_id: i64, now: DateTime<Utc>) -> Result<RateDecision> {
        let window = HourWindow::containing(now);
        let key = format!(
            "hyprbot:ratelimit:{}:{}:{}",
            chat_id,
            user_id,
            window.bucket_tag()
        );

        let mut conn = self.conn.clone();
        let used: i64 = Script::new(INCR_WITH_TTL)
            .key(key)
            .arg(window.ttl_seconds(now))
            .invoke_async(&mut conn)
            .await?;

        Ok(RateDecision {
            allowed: used <= self.limit,
            used,
            reset_at: window.end,
        })
    }
}

/// One UTC hour bucket.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HourWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HourWindow {
    pub fn containing(now: DateTime<Utc>) -> Self {
        let start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        Self {
            start,
            end: start + ChronoDuration::hours(1),
        }
    }

    /// Key suffix for the bucket, e.g. `2026021310`.
    pub fn bucket_tag(&self) -> String {
        self.start.format("%Y%m%d%H").to_string()
    }

    /// Seconds until the window rolls, floored at 1.
    pub fn ttl_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.end - now).num_seconds().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_starts_at_top_of_hour() {
        let now = Utc.with_ymd_and_hms(2026, 2, 13, 10, 15, 42).unwrap();
        let w = HourWindow::containing(now);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 2, 13, 10, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 2, 13, 11, 0, 0).unwrap());
        assert_eq!(w.bucket_tag(), "2026021310");
    }

    #[test]
    fn ttl_counts_down_to_next_hour() {
        let now = Utc.with_ymd_and_hms(2026, 2, 13, 10, 15, 0).unwrap();
        let w = HourWindow::containing(now);
        assert_eq!(w.ttl_seconds(now), 45 * 60);

        // At the last instant the TTL is floored at 1.
        let end_edge = Utc.with_ymd_and_hms(2026, 2, 13, 10, 59, 59).unwrap();
        let w = HourWindow::containing(end_edge);
        assert_eq!(w.ttl_seconds(end_edge), 1);
    }

    #[test]
    fn buckets_roll_over_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 2, 13, 23, 59, 0).unwrap();
        let w = HourWindow::containing(now);
        assert_eq!(w.bucket_tag(), "2026021323");
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 2, 14, 0, 0, 0).unwrap());
    }
}
