//! Frame pacing against wall-clock time

use std::time::{Duration, Instant};
use tracing::debug;

/// Wall-clock source and sleep primitive used by the relay loop
pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

/// Real monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Decides whether a new frame may be emitted now
///
/// While pumps keep up, `next_frame_time` moves forward by whole
/// `frame_interval` steps, so the schedule after K pumps is
/// `start + K * frame_interval` however late within its slot each pump ran.
/// A pump running a full interval or more behind schedule restarts the
/// schedule from that pump: missed slots are dropped, never sent back to back.
#[derive(Debug, Clone)]
pub struct PacingController {
    frame_interval: Duration,
    next_frame_time: Instant,
    resyncs: u64,
}

impl PacingController {
    /// Start pacing with the first frame permitted at `now`.
    pub fn new(frame_interval: Duration, now: Instant) -> Self {
        Self { frame_interval, next_frame_time: now, resyncs: 0 }
    }

    /// Returns `now >= next_frame_time`.
    pub fn may_pump_now(&self, now: Instant) -> bool {
        now >= self.next_frame_time
    }

    /// Record a successful pump that ran at `now`.
    pub fn advance(&mut self, now: Instant) {
        if !self.frame_interval.is_zero() && now >= self.next_frame_time + self.frame_interval {
            debug!(
                behind_ms = now.saturating_duration_since(self.next_frame_time).as_millis() as u64,
                "Pacing fell behind, restarting schedule"
            );
            self.next_frame_time = now;
            self.resyncs += 1;
        }
        self.next_frame_time += self.frame_interval;
    }

    /// Permit the next frame at `now`, discarding the current schedule.
    pub fn restart(&mut self, now: Instant) {
        self.next_frame_time = now;
    }

    pub fn next_frame_time(&self) -> Instant {
        self.next_frame_time
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Times the schedule was restarted after falling behind
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn schedule_is_additive_while_keeping_up(
            interval_us in 1u64..100_000u64,
            lateness_permille in prop::collection::vec(0u64..1000, 0..200)
        ) {
            let start = Instant::now();
            let interval = Duration::from_micros(interval_us);
            let mut pacing = PacingController::new(interval, start);
            for permille in &lateness_permille {
                // Pump somewhere inside its own slot.
                let now = pacing.next_frame_time() + Duration::from_micros(interval_us * permille / 1000);
                prop_assert!(pacing.may_pump_now(now));
                pacing.advance(now);
            }
            prop_assert_eq!(pacing.next_frame_time(), start + interval * lateness_permille.len() as u32);
            prop_assert_eq!(pacing.resyncs(), 0);
        }

        #[test]
        fn never_two_pumps_closer_than_interval_after_a_stall(
            interval_ms in 1u64..50u64,
            stall_ms in 0u64..2_000u64
        ) {
            let start = Instant::now();
            let interval = Duration::from_millis(interval_ms);
            let mut pacing = PacingController::new(interval, start);

            let first = start + Duration::from_millis(stall_ms);
            pacing.advance(first);
            prop_assert!(pacing.next_frame_time() > first);
            if stall_ms >= interval_ms {
                prop_assert_eq!(pacing.next_frame_time() - first, interval);
            } else {
                prop_assert_eq!(pacing.next_frame_time(), start + interval);
            }
        }

        #[test]
        fn gate_opens_exactly_at_schedule(offset_us in 0u64..10_000u64) {
            let start = Instant::now();
            let mut pacing = PacingController::new(Duration::from_millis(20), start);
            pacing.advance(start);
            let next = pacing.next_frame_time();
            let at = start + Duration::from_micros(offset_us);
            prop_assert_eq!(pacing.may_pump_now(at), at >= next);
        }
    }

    #[test]
    fn first_frame_is_permitted_immediately() {
        let now = Instant::now();
        let pacing = PacingController::new(Duration::from_millis(33), now);
        assert!(pacing.may_pump_now(now));
    }

    #[test]
    fn late_pump_within_slot_does_not_shift_schedule() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let mut pacing = PacingController::new(interval, start);

        // Pump ran 7ms late; next slot is still start + 10ms, not late + 10ms.
        let late = start + Duration::from_millis(7);
        assert!(pacing.may_pump_now(late));
        pacing.advance(late);
        assert_eq!(pacing.next_frame_time(), start + interval);
        assert!(!pacing.may_pump_now(start + Duration::from_millis(9)));
        assert!(pacing.may_pump_now(start + Duration::from_millis(10)));
        assert_eq!(pacing.resyncs(), 0);
    }

    #[test]
    fn stalled_schedule_restarts_from_late_pump() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let mut pacing = PacingController::new(interval, start);

        // Nothing pumped for 200ms, then one pump.
        let resumed = start + Duration::from_millis(205);
        pacing.advance(resumed);

        assert_eq!(pacing.next_frame_time(), resumed + interval);
        assert!(!pacing.may_pump_now(resumed + Duration::from_millis(9)));
        assert_eq!(pacing.resyncs(), 1);
    }

    #[test]
    fn restart_moves_schedule_to_now() {
        let start = Instant::now();
        let mut pacing = PacingController::new(Duration::from_millis(10), start);
        let later = start + Duration::from_secs(3);
        pacing.restart(later);
        assert_eq!(pacing.next_frame_time(), later);
        assert!(!pacing.may_pump_now(start + Duration::from_secs(2)));
    }

    #[test]
    fn unpaced_never_resyncs() {
        let start = Instant::now();
        let mut pacing = PacingController::new(Duration::ZERO, start);
        pacing.advance(start + Duration::from_secs(1));
        assert_eq!(pacing.next_frame_time(), start);
        assert_eq!(pacing.resyncs(), 0);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.now() > a);
    }
}
