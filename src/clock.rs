//! Show clocks: beat phase generators with tap tempo, driven by the tick loop.

use std::time::{Duration, Instant};

pub(crate) mod tap;

pub use tap::{TapState, TapTempo};

use crate::utils::wrap_phase;

// -------------------------------------------------------------------------------------------------

/// Number of auxiliary clocks published alongside the master clock.
pub const AUX_CLOCK_COUNT: usize = 4;

/// Tempo a cold clock starts out with.
pub const DEFAULT_BPM: f64 = 120.0;

const MIN_BPM: f64 = 20.0;
const MAX_BPM: f64 = 300.0;

// -------------------------------------------------------------------------------------------------

/// One beat-phase generator.
///
/// Phase is the radial unit in `[0, 1)`; one full wrap is one beat. The tick loop advances the
/// clock by wall-time deltas, scaled by the beat period and the submaster rate scale.
#[derive(Debug, Clone)]
pub struct Clock {
    beat_period: Duration,
    rate_scale: f64,
    phase: f64,
    beat_number: u64,
    tap: TapTempo,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Clock {
    pub fn new(bpm: f64) -> Self {
        let beat_period = Duration::from_secs_f64(60.0 / bpm.clamp(MIN_BPM, MAX_BPM));
        Self {
            beat_period,
            rate_scale: 1.0,
            phase: 0.0,
            beat_number: 0,
            tap: TapTempo::new(beat_period),
        }
    }

    /// Advance by a wall-time delta, updating phase and beat number.
    pub fn advance(&mut self, dt: Duration) {
        let total = self.phase + self.beats_for(dt);
        let wrapped = total.floor();
        if wrapped >= 1.0 {
            self.beat_number = self.beat_number.wrapping_add(wrapped as u64);
        }
        self.phase = wrap_phase(total);
    }

    /// The beat fraction a wall-time delta corresponds to at the current tempo.
    #[inline]
    pub fn beats_for(&self, dt: Duration) -> f64 {
        dt.as_secs_f64() / self.beat_period.as_secs_f64() * self.rate_scale
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Force the beat phase, wrapped into `[0, 1)`.
    pub fn set_phase(&mut self, phase: f64) {
        self.phase = wrap_phase(phase);
    }

    pub fn beat_number(&self) -> u64 {
        self.beat_number
    }

    pub fn bpm(&self) -> f64 {
        60.0 / self.beat_period.as_secs_f64()
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.beat_period = Duration::from_secs_f64(60.0 / bpm.clamp(MIN_BPM, MAX_BPM));
    }

    pub fn rate_scale(&self) -> f64 {
        self.rate_scale
    }

    /// Set the submaster rate scale. Clamped to `[0, 4]`; zero freezes the clock.
    pub fn set_rate_scale(&mut self, scale: f64) {
        self.rate_scale = scale.clamp(0.0, 4.0);
    }

    /// Resync the beat phase to zero.
    pub fn nudge(&mut self) {
        self.phase = 0.0;
    }

    /// Register a tap-tempo tap; adopts the estimator's new period when one is available.
    pub fn tap(&mut self, now: Instant) {
        if let Some(period) = self.tap.tap(now) {
            self.beat_period = period;
        }
    }

    pub fn tap_state(&self) -> TapState {
        self.tap.state()
    }
}

// -------------------------------------------------------------------------------------------------

/// The master clock plus [`AUX_CLOCK_COUNT`] independently tap-tempo'd auxiliary clocks.
#[derive(Debug, Clone, Default)]
pub struct MasterClock {
    master: Clock,
    aux: [Clock; AUX_CLOCK_COUNT],
}

impl MasterClock {
    pub fn new(bpm: f64) -> Self {
        Self {
            master: Clock::new(bpm),
            aux: std::array::from_fn(|_| Clock::new(bpm)),
        }
    }

    pub fn master(&self) -> &Clock {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut Clock {
        &mut self.master
    }

    /// Auxiliary clock by index; indices wrap into the fixed clock count.
    pub fn aux(&self, index: usize) -> &Clock {
        &self.aux[index % AUX_CLOCK_COUNT]
    }

    pub fn aux_mut(&mut self, index: usize) -> &mut Clock {
        &mut self.aux[index % AUX_CLOCK_COUNT]
    }

    /// Advance master and auxiliary clocks by a wall-time delta.
    pub fn advance(&mut self, dt: Duration) {
        self.master.advance(dt);
        for clock in &mut self.aux {
            clock.advance(dt);
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::assert_eq_with_epsilon;

    #[test]
    fn phase_advances_with_tempo() {
        let mut clock = Clock::new(120.0); // 500ms beats
        clock.advance(Duration::from_millis(125));
        assert_eq_with_epsilon!(clock.phase(), 0.25, 1e-9);
        assert_eq!(clock.beat_number(), 0);
        clock.advance(Duration::from_millis(500));
        assert_eq_with_epsilon!(clock.phase(), 0.25, 1e-9);
        assert_eq!(clock.beat_number(), 1);
    }

    #[test]
    fn rate_scale_scales_time() {
        let mut clock = Clock::new(120.0);
        clock.set_rate_scale(2.0);
        clock.advance(Duration::from_millis(250));
        assert_eq_with_epsilon!(clock.phase(), 0.5, 1e-9);
        clock.set_rate_scale(0.0);
        clock.advance(Duration::from_secs(10));
        assert_eq_with_epsilon!(clock.phase(), 0.5, 1e-9);
    }

    #[test]
    fn multi_beat_tick_counts_all_beats() {
        let mut clock = Clock::new(120.0);
        clock.advance(Duration::from_millis(1750));
        assert_eq!(clock.beat_number(), 3);
        assert_eq_with_epsilon!(clock.phase(), 0.5, 1e-9);
    }

    #[test]
    fn nudge_resyncs_phase_only() {
        let mut clock = Clock::new(120.0);
        clock.advance(Duration::from_millis(600));
        clock.nudge();
        assert_eq!(clock.phase(), 0.0);
        assert_eq!(clock.beat_number(), 1);
        assert_eq_with_epsilon!(clock.bpm(), 120.0, 1e-9);
    }

    #[test]
    fn taps_retune_the_clock() {
        let mut clock = Clock::new(120.0);
        let origin = Instant::now();
        for offset in [0u64, 250, 500, 750] {
            clock.tap(origin + Duration::from_millis(offset));
        }
        assert_eq_with_epsilon!(clock.bpm(), 240.0, 1e-6);
        assert_eq!(clock.tap_state(), TapState::Locked);
    }

    #[test]
    fn aux_clocks_run_independently() {
        let mut clocks = MasterClock::new(120.0);
        clocks.aux_mut(1).set_bpm(60.0);
        clocks.advance(Duration::from_millis(250));
        assert_eq_with_epsilon!(clocks.master().phase(), 0.5, 1e-9);
        assert_eq_with_epsilon!(clocks.aux(1).phase(), 0.25, 1e-9);
        assert_eq_with_epsilon!(clocks.aux(0).phase(), 0.5, 1e-9);
    }
}
