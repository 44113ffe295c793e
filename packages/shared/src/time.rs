//! Wall-clock access for message timestamps.
//!
//! Server components take an `Arc<dyn Clock>` so tests can pin `received_at`.
//! Liveness (heartbeats, dedup retention) uses monotonic `Instant`s instead.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Source of Unix time in milliseconds (UTC)
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// `2023-01-01 00:00:00 UTC` style rendering for terminals.
///
/// Out-of-range values are printed as the raw number.
pub fn format_millis_utc(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_moves_only_on_advance() {
        // テスト項目: FixedClock は advance したときだけ時刻が進む
        // given (前提条件):
        let clock = FixedClock::new(1_000);

        // when (操作):
        let before = clock.now_millis();
        clock.advance(250);
        let after = clock.now_millis();

        // then (期待する結果):
        assert_eq!(before, 1_000);
        assert_eq!(after, 1_250);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // テスト項目: SystemClock が現在の UTC ミリ秒を返す
        // given (前提条件):
        let clock = SystemClock;

        // when (操作):
        let now = clock.now_millis();

        // then (期待する結果):
        assert!(now > 1_577_836_800_000);
    }

    #[test]
    fn test_format_millis_utc() {
        // テスト項目: ミリ秒が秒単位の UTC 表記になり、範囲外は数値のまま表示される
        // given (前提条件):
        let timestamp = 1_672_531_200_123;

        // when (操作):
        let formatted = format_millis_utc(timestamp);
        let out_of_range = format_millis_utc(i64::MAX);

        // then (期待する結果):
        assert_eq!(formatted, "2023-01-01 00:00:00 UTC");
        assert_eq!(out_of_range, i64::MAX.to_string());
    }
}
