//! Consecutive-failure tracking for one service.
//!
//! The tracker is a small state machine: `Healthy` while the count is zero,
//! `Degraded(n)` below the threshold, and a one-cycle `ThresholdReached`
//! edge when the count hits the threshold. The count resets after that
//! edge, so a service that stays down alerts once per `threshold` failures
//! with `failure_backoff` between rounds.

use std::num::NonZeroU32;
use std::time::Duration;

use pulse_core::ServiceSpec;
use tracing::{debug, warn};

/// What a single recorded result did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Success with no prior failures.
    Healthy,
    /// Success after `failures` consecutive failures.
    Recovered { failures: u32 },
    /// Failure still below the threshold.
    Degraded { failures: u32 },
    /// Failure that reached the threshold. Notify, then back off.
    ThresholdReached { failures: u32 },
}

impl Transition {
    pub fn is_healthy(self) -> bool {
        matches!(self, Transition::Healthy | Transition::Recovered { .. })
    }
}

/// Tracks consecutive failures for a single service.
#[derive(Debug)]
pub struct HealthTracker {
    consecutive_failures: u32,
    threshold: NonZeroU32,
    check_period: Duration,
    failure_backoff: Duration,
}

impl HealthTracker {
    pub fn new(threshold: NonZeroU32, check_period: Duration, failure_backoff: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            threshold,
            check_period,
            failure_backoff,
        }
    }

    pub fn for_service(spec: &ServiceSpec) -> Self {
        Self::new(spec.threshold, spec.check_period, spec.failure_backoff)
    }

    /// Record one evaluated probe.
    pub fn record(&mut self, healthy: bool) -> Transition {
        if healthy {
            let failures = std::mem::take(&mut self.consecutive_failures);
            if failures > 0 {
                debug!(failures, "service recovered");
                return Transition::Recovered { failures };
            }
            return Transition::Healthy;
        }

        self.consecutive_failures += 1;
        let failures = self.consecutive_failures;
        if failures >= self.threshold.get() {
            warn!(failures, threshold = self.threshold.get(), "failure threshold reached");
            self.consecutive_failures = 0;
            Transition::ThresholdReached { failures }
        } else {
            Transition::Degraded { failures }
        }
    }

    /// How long to wait before the next cycle after `transition`.
    pub fn next_interval(&self, transition: Transition) -> Duration {
        match transition {
            Transition::ThresholdReached { .. } => self.failure_backoff,
            _ => self.check_period,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(30);
    const BACKOFF: Duration = Duration::from_secs(300);

    fn tracker(threshold: u32) -> HealthTracker {
        HealthTracker::new(NonZeroU32::new(threshold).unwrap(), PERIOD, BACKOFF)
    }

    #[test]
    fn starts_with_no_failures() {
        let t = tracker(3);
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.threshold(), 3);
    }

    #[test]
    fn threshold_three_alerts_once_then_resets() {
        let mut t = tracker(3);
        assert_eq!(t.record(false), Transition::Degraded { failures: 1 });
        assert_eq!(t.record(false), Transition::Degraded { failures: 2 });

        let edge = t.record(false);
        assert_eq!(edge, Transition::ThresholdReached { failures: 3 });
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.next_interval(edge), BACKOFF);

        // The fourth failure starts a new round instead of re-alerting.
        let next = t.record(false);
        assert_eq!(next, Transition::Degraded { failures: 1 });
        assert_eq!(t.next_interval(next), PERIOD);
    }

    #[test]
    fn success_below_threshold_resets_without_alert() {
        let mut t = tracker(3);
        t.record(false);
        t.record(false);
        let recovered = t.record(true);
        assert_eq!(recovered, Transition::Recovered { failures: 2 });
        assert!(recovered.is_healthy());
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.next_interval(recovered), PERIOD);

        assert_eq!(t.record(false), Transition::Degraded { failures: 1 });
    }

    #[test]
    fn threshold_one_alerts_on_first_failure() {
        let mut t = tracker(1);
        assert_eq!(t.record(false), Transition::ThresholdReached { failures: 1 });
        assert_eq!(t.record(false), Transition::ThresholdReached { failures: 1 });
    }

    #[test]
    fn success_after_alert_is_plain_healthy() {
        let mut t = tracker(2);
        t.record(false);
        t.record(false);
        assert_eq!(t.record(true), Transition::Healthy);
    }

    #[test]
    fn healthy_streak_sleeps_check_period() {
        let mut t = tracker(3);
        for _ in 0..5 {
            let tr = t.record(true);
            assert_eq!(tr, Transition::Healthy);
            assert_eq!(t.next_interval(tr), PERIOD);
        }
    }
}
