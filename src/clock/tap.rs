//! Tap-tempo beat period estimation.

use std::time::{Duration, Instant};

// -------------------------------------------------------------------------------------------------

/// Taps kept in the sliding estimation window.
const TAP_WINDOW: usize = 4;

/// Relative delta spread below which the estimator reports a lock.
const LOCK_TOLERANCE: f64 = 0.1;

/// A tap further than this factor times the current estimate starts a new tap sequence.
const RESTART_FACTOR: u32 = 2;

// -------------------------------------------------------------------------------------------------

/// Estimator confidence.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum TapState {
    /// No usable taps yet; the estimator reports its default period.
    #[default]
    Cold,
    /// At least two taps: a rough estimate.
    Warm,
    /// A full window of evenly spaced taps.
    Locked,
}

// -------------------------------------------------------------------------------------------------

/// Estimates a beat period as the median of pairwise deltas over a sliding window of the last
/// `TAP_WINDOW` taps. A stale tap (more than `RESTART_FACTOR` times the current estimate after
/// the previous one) restarts the window rather than entering it; the period estimate and lock
/// state carry over, so the next tap sequence re-estimates from a clean window. See DESIGN.md's
/// open-question ledger for the restart-vs-ignore choice.
#[derive(Debug, Clone)]
pub struct TapTempo {
    taps: Vec<Instant>,
    period: Duration,
    state: TapState,
}

impl TapTempo {
    pub fn new(default_period: Duration) -> Self {
        Self {
            taps: Vec::with_capacity(TAP_WINDOW + 1),
            period: default_period,
            state: TapState::Cold,
        }
    }

    /// The current beat period estimate.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    /// Register a tap. Returns the new period estimate when one could be derived.
    pub fn tap(&mut self, now: Instant) -> Option<Duration> {
        if let Some(&last) = self.taps.last() {
            if now.duration_since(last) > self.period * RESTART_FACTOR {
                self.taps.clear();
            }
        }
        self.taps.push(now);
        if self.taps.len() > TAP_WINDOW {
            self.taps.remove(0);
        }
        if self.taps.len() < 2 {
            return None;
        }

        let mut deltas: Vec<f64> = self
            .taps
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]).as_secs_f64())
            .collect();
        deltas.sort_by(f64::total_cmp);
        let median = if deltas.len() % 2 == 1 {
            deltas[deltas.len() / 2]
        } else {
            (deltas[deltas.len() / 2 - 1] + deltas[deltas.len() / 2]) / 2.0
        };

        self.period = Duration::from_secs_f64(median);
        let evenly_spaced = deltas
            .iter()
            .all(|delta| (delta - median).abs() <= median * LOCK_TOLERANCE);
        self.state = if self.taps.len() >= TAP_WINDOW && evenly_spaced {
            TapState::Locked
        } else {
            TapState::Warm
        };
        Some(self.period)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::assert_eq_with_epsilon;

    const BEAT: Duration = Duration::from_millis(500);

    fn tap_at(tempo: &mut TapTempo, origin: Instant, offset_ms: u64) -> Option<Duration> {
        tempo.tap(origin + Duration::from_millis(offset_ms))
    }

    #[test]
    fn state_transitions() {
        let origin = Instant::now();
        let mut tempo = TapTempo::new(BEAT);
        assert_eq!(tempo.state(), TapState::Cold);
        assert_eq!(tempo.period(), BEAT);

        tap_at(&mut tempo, origin, 0);
        assert_eq!(tempo.state(), TapState::Cold);
        tap_at(&mut tempo, origin, 500);
        assert_eq!(tempo.state(), TapState::Warm);
        tap_at(&mut tempo, origin, 1000);
        tap_at(&mut tempo, origin, 1500);
        assert_eq!(tempo.state(), TapState::Locked);
        assert_eq!(tempo.period(), BEAT);
    }

    #[test]
    fn estimate_converges_under_jitter() {
        let origin = Instant::now();
        let mut tempo = TapTempo::new(Duration::from_millis(450));
        // true period 500ms, a few ms of deterministic jitter per tap
        let mut estimate = None;
        for (index, jitter) in [0i64, 9, -7, 4, -3, 6].iter().enumerate() {
            let at = (index as i64 * 500 + jitter) as u64;
            estimate = tap_at(&mut tempo, origin, at).or(estimate);
        }
        let estimate = estimate.unwrap().as_secs_f64();
        assert_eq_with_epsilon!(estimate, 0.5, 0.01);
        assert_eq!(tempo.state(), TapState::Locked);
    }

    #[test]
    fn stale_tap_restarts_the_sequence() {
        let origin = Instant::now();
        let mut tempo = TapTempo::new(BEAT);
        for offset in [0, 500, 1000, 1500] {
            tap_at(&mut tempo, origin, offset);
        }
        assert_eq!(tempo.period(), BEAT);

        // a pause of several beats must not drag the estimate up
        assert_eq!(tap_at(&mut tempo, origin, 6000), None);
        assert_eq!(tempo.period(), BEAT);

        // and a fresh sequence at a new tempo takes over
        tap_at(&mut tempo, origin, 6250);
        tap_at(&mut tempo, origin, 6500);
        tap_at(&mut tempo, origin, 6750);
        assert_eq!(tempo.period(), Duration::from_millis(250));
        assert_eq!(tempo.state(), TapState::Locked);
    }
}
