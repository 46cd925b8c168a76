//! # GHST Failsafe Tracker
//!
//! The protocol has no failsafe signalling of its own: frames are passed on
//! as they arrive and signal loss is inferred from their arrival times.
//!
//! Each uplink RC subtype is tracked separately. Losing an aux channel group
//! (flight mode, arm switch) is as unsafe as losing the sticks, so a timeout
//! on any subtype that has ever been seen declares signal loss. Subtypes that
//! were never seen are skipped: not every receiver sends every subtype.

use tracing::debug;

use super::protocol::{
    UplinkSubtype, GHST_RC_FRAME_COUNT_THRESHOLD, GHST_RC_FRAME_TIMEOUT_MS, GHST_UL_RC_CHANS_FRAME_COUNT,
};

/// Arrival history of one uplink subtype
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerEntry {
    /// Millisecond timestamp of the last arrival, `None` if never seen
    pub last_seen_ms: Option<u32>,
    /// Consecutive arrivals without a timeout, saturating at the threshold
    pub on_time_counter: u8,
}

/// Per-subtype signal loss detection
#[derive(Debug, Clone)]
pub struct FailsafeTracker {
    entries: [TrackerEntry; GHST_UL_RC_CHANS_FRAME_COUNT],
    timeout_ms: u32,
    threshold: u8,
}

impl Default for FailsafeTracker {
    fn default() -> Self {
        Self::new(GHST_RC_FRAME_TIMEOUT_MS, GHST_RC_FRAME_COUNT_THRESHOLD)
    }
}

impl FailsafeTracker {
    /// Create a tracker
    ///
    /// # Arguments
    ///
    /// * `timeout_ms` - Time without a subtype after which the link is lost
    /// * `threshold` - On-time arrivals needed before a subtype counts as healthy
    pub fn new(timeout_ms: u32, threshold: u8) -> Self {
        Self {
            entries: [TrackerEntry::default(); GHST_UL_RC_CHANS_FRAME_COUNT],
            timeout_ms,
            threshold,
        }
    }

    /// Note the arrival of an accepted frame of `subtype`
    pub fn record_arrival(&mut self, subtype: UplinkSubtype, now_ms: u32) {
        let threshold = self.threshold;
        let entry = &mut self.entries[subtype.index()];

        if entry.on_time_counter < threshold {
            entry.on_time_counter += 1;
        }
        entry.last_seen_ms = Some(now_ms);
    }

    /// Whether the link should be considered lost
    ///
    /// A timed-out subtype has its on-time counter reset, so recovery needs
    /// `threshold` fresh arrivals.
    pub fn detect_failsafe(&mut self, now_ms: u32) -> bool {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            let Some(last_seen_ms) = entry.last_seen_ms else {
                continue;
            };

            if now_ms.wrapping_sub(last_seen_ms) >= self.timeout_ms {
                if entry.on_time_counter != 0 {
                    debug!(subtype = idx, last_seen_ms, now_ms, "GHST subtype timed out");
                }
                entry.on_time_counter = 0;
                return true;
            }

            if entry.on_time_counter < self.threshold {
                return true;
            }
        }

        false
    }

    /// Tracker state for one subtype
    pub fn entry(&self, subtype: UplinkSubtype) -> TrackerEntry {
        self.entries[subtype.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrivals(tracker: &mut FailsafeTracker, subtype: UplinkSubtype, count: u32, start_ms: u32) {
        for i in 0..count {
            tracker.record_arrival(subtype, start_ms + i * 10);
        }
    }

    #[test]
    fn test_nothing_seen_is_not_failsafe() {
        let mut tracker = FailsafeTracker::default();
        assert!(!tracker.detect_failsafe(1_000));
        assert!(!tracker.detect_failsafe(u32::MAX));
    }

    #[test]
    fn test_counter_saturates_at_threshold() {
        let mut tracker = FailsafeTracker::default();
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 10, 100);

        let entry = tracker.entry(UplinkSubtype::Channels5To8);
        assert_eq!(entry.on_time_counter, GHST_RC_FRAME_COUNT_THRESHOLD);
        assert_eq!(entry.last_seen_ms, Some(190));
    }

    #[test]
    fn test_below_threshold_is_failsafe() {
        let mut tracker = FailsafeTracker::default();
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 3, 100);
        assert!(tracker.detect_failsafe(130));

        tracker.record_arrival(UplinkSubtype::Channels5To8, 130);
        assert!(!tracker.detect_failsafe(131));
    }

    #[test]
    fn test_timeout_resets_counter_and_reports_failsafe() {
        let mut tracker = FailsafeTracker::default();
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 4, 100);
        assert!(!tracker.detect_failsafe(130 + GHST_RC_FRAME_TIMEOUT_MS - 1));

        assert!(tracker.detect_failsafe(130 + GHST_RC_FRAME_TIMEOUT_MS));
        assert_eq!(tracker.entry(UplinkSubtype::Channels5To8).on_time_counter, 0);

        // One fresh arrival is not enough to recover
        tracker.record_arrival(UplinkSubtype::Channels5To8, 1_000);
        assert!(tracker.detect_failsafe(1_001));

        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 3, 1_010);
        assert!(!tracker.detect_failsafe(1_031));
    }

    #[test]
    fn test_never_seen_subtype_does_not_block_recovery() {
        let mut tracker = FailsafeTracker::default();
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 4, 100);
        arrivals(&mut tracker, UplinkSubtype::Rssi, 4, 105);

        // 9-12 and 13-16 were never sent by this receiver
        assert!(!tracker.detect_failsafe(150));
        assert_eq!(tracker.entry(UplinkSubtype::Channels9To12), TrackerEntry::default());
    }

    #[test]
    fn test_losing_aux_group_is_failsafe() {
        let mut tracker = FailsafeTracker::default();
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 4, 100);
        arrivals(&mut tracker, UplinkSubtype::Channels9To12, 4, 100);

        // Primary group keeps arriving, 9-12 stops
        arrivals(&mut tracker, UplinkSubtype::Channels5To8, 40, 140);
        assert!(tracker.detect_failsafe(530));
        assert_eq!(tracker.entry(UplinkSubtype::Channels9To12).on_time_counter, 0);
        assert_eq!(tracker.entry(UplinkSubtype::Channels5To8).on_time_counter, GHST_RC_FRAME_COUNT_THRESHOLD);
    }

    #[test]
    fn test_arrival_at_time_zero_counts_as_seen() {
        let mut tracker = FailsafeTracker::default();
        tracker.record_arrival(UplinkSubtype::Rssi, 0);
        assert_eq!(tracker.entry(UplinkSubtype::Rssi).last_seen_ms, Some(0));
        assert!(tracker.detect_failsafe(GHST_RC_FRAME_TIMEOUT_MS));
    }

    #[test]
    fn test_custom_timeout_and_threshold() {
        let mut tracker = FailsafeTracker::new(50, 2);
        arrivals(&mut tracker, UplinkSubtype::Channels13To16, 2, 0);
        assert!(!tracker.detect_failsafe(59));
        assert!(tracker.detect_failsafe(60));
    }

    #[test]
    fn test_millisecond_wraparound() {
        let mut tracker = FailsafeTracker::default();
        let start = u32::MAX - 20;
        for i in 0..4u32 {
            tracker.record_arrival(UplinkSubtype::Channels5To8, start.wrapping_add(i * 10));
        }
        assert!(!tracker.detect_failsafe(start.wrapping_add(100)));
        assert!(tracker.detect_failsafe(start.wrapping_add(30 + GHST_RC_FRAME_TIMEOUT_MS)));
    }
}
