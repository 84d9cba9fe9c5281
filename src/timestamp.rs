//! Coarse monotonic timestamps with rollover detection.
//!
//! The migration controller's hysteresis arithmetic only ever needs a
//! signed "how long ago" duration relative to now. Rather than lean on
//! `std::time::Instant` (whose representable range never meaningfully
//! wraps on any platform we run on, which would make rollover handling
//! dead code), this stores a wrapping millisecond counter — the same
//! hazard a 32-bit monotonic clock has in the wild — so rollover danger
//! is a real, testable condition instead of a method that always
//! returns `false`.

use std::sync::OnceLock;
use std::time::Instant;

/// Half of the `u32` millisecond range: past this many milliseconds, a
/// wrapping difference can no longer be told apart from its own
/// rollover and the sign would flip.
const AMBIGUITY_THRESHOLD_MS: u32 = u32::MAX / 2;

/// Safety margin subtracted from the ambiguity threshold. A timestamp is
/// reported as rollover danger once it is this close to becoming
/// unreadable, not only once it already is.
const ROLLOVER_MARGIN_MS: u32 = 60_000;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

fn now_millis() -> u32 {
    process_epoch().elapsed().as_millis() as u32
}

/// A coarse monotonic timestamp, good for computing "milliseconds since
/// this was taken" even as the underlying counter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Capture the current time.
    pub fn now() -> Self {
        Timestamp(now_millis())
    }

    /// Signed milliseconds between this timestamp and now. Positive
    /// means this timestamp is in the past (the common case); it can
    /// only be negative if the process-wide millisecond counter wrapped
    /// between construction and this call, which [`is_rollover_danger`]
    /// exists to prevent callers from ever observing.
    ///
    /// [`is_rollover_danger`]: Timestamp::is_rollover_danger
    pub fn offset_from_now(&self) -> i64 {
        let elapsed = now_millis().wrapping_sub(self.0);
        elapsed as i32 as i64
    }

    /// True once this timestamp is close enough to the point where the
    /// wrapping counter would make [`offset_from_now`] ambiguous.
    /// Callers (the migration controller) null out any stored timestamp
    /// that reports this, so hysteresis arithmetic never has to deal
    /// with it.
    ///
    /// [`offset_from_now`]: Timestamp::offset_from_now
    pub fn is_rollover_danger(&self) -> bool {
        let elapsed = now_millis().wrapping_sub(self.0);
        elapsed >= AMBIGUITY_THRESHOLD_MS.saturating_sub(ROLLOVER_MARGIN_MS)
    }

    #[cfg(test)]
    pub(crate) fn from_raw_millis(millis: u32) -> Self {
        Timestamp(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_has_nonnegative_offset() {
        let ts = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(ts.offset_from_now() >= 5);
    }

    #[test]
    fn fresh_timestamp_is_not_rollover_danger() {
        assert!(!Timestamp::now().is_rollover_danger());
    }

    #[test]
    fn near_ambiguity_threshold_is_rollover_danger() {
        let current = now_millis();
        let stale = current.wrapping_sub(AMBIGUITY_THRESHOLD_MS - 1);
        let ts = Timestamp::from_raw_millis(stale);
        assert!(ts.is_rollover_danger());
    }

    #[test]
    fn well_within_range_is_not_rollover_danger() {
        let current = now_millis();
        let recent = current.wrapping_sub(1_000);
        let ts = Timestamp::from_raw_millis(recent);
        assert!(!ts.is_rollover_danger());
    }
}
