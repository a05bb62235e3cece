//! Animators: clock-synchronized waveform oscillators which modulate beam parameters.
//!
//! Animators are plain data. They never reference the beam whose parameters they modulate;
//! instead every beam owns an [`AnimatorBank`] which evaluates its slots against the show clocks
//! into a [`ModulationTable`], and the beam itself applies the table to its parameter set. This
//! keeps the animator ↔ beam relation acyclic and the per-tick evaluation allocation free.

use serde::{Deserialize, Serialize};
use strum::VariantArray;

use crate::clock::MasterClock;
use crate::utils::wrap_phase;
use crate::waveform::WaveformKind;

// -------------------------------------------------------------------------------------------------

/// Number of animator slots in every bank.
pub const ANIMATOR_COUNT: usize = 4;

// -------------------------------------------------------------------------------------------------

/// Which clock an animator derives its phase from.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockSource {
    /// Locked to the master clock's beat phase.
    #[default]
    Master,
    /// Locked to one of the auxiliary clocks.
    Aux(usize),
    /// Free running: the animator accumulates its own phase at `speed` cycles per master beat.
    FreeRun,
}

// -------------------------------------------------------------------------------------------------

/// Beam parameters an animator can modulate.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
)]
pub enum AnimationTarget {
    RotationSpeed,
    Thickness,
    Size,
    AspectRatio,
    ColCenter,
    ColWidth,
    ColSpread,
    ColSaturation,
    MarqueeSpeed,
    PositionX,
    PositionY,
}

impl AnimationTarget {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

const TARGET_COUNT: usize = AnimationTarget::VARIANTS.len();

// -------------------------------------------------------------------------------------------------

/// How an animator slot's output combines with earlier slots targeting the same parameter.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum MixMode {
    /// Add to the accumulated modulation.
    #[default]
    Sum,
    /// Keep the larger of accumulated and new value.
    Max,
    /// Scale the accumulated modulation. A multiply slot with no earlier source contributes
    /// nothing, since the table starts at zero.
    Multiply,
}

// -------------------------------------------------------------------------------------------------

/// A single waveform oscillator.
///
/// Emits `weight · f(speed · phase + offset)` per tick, where `phase` comes from the selected
/// clock (or the free-run accumulator) and `f` is the configured [`WaveformKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Animator {
    pub waveform: WaveformKind,
    /// Cycles per beat, signed. Bipolar knob, detented at zero.
    pub speed: f64,
    /// Output scale in `[0, 1]`. A zero weight disables the animator entirely.
    pub weight: f64,
    /// Transition smoothing for the discontinuous waveforms, `[0, 0.5]`.
    pub smoothing: f64,
    /// Fraction of the cycle the wave is active in, `[0, 1]`.
    pub duty_cycle: f64,
    /// Unipolar pulse variant instead of the bipolar wave.
    pub pulse: bool,
    pub clock_source: ClockSource,
    /// Static phase offset added on top of the clock phase.
    pub phase_offset: f64,
    #[serde(skip)]
    free_phase: f64,
}

impl Default for Animator {
    fn default() -> Self {
        Self {
            waveform: WaveformKind::default(),
            speed: 0.0,
            weight: 0.0,
            smoothing: 0.0,
            duty_cycle: 1.0,
            pulse: false,
            clock_source: ClockSource::default(),
            phase_offset: 0.0,
            free_phase: 0.0,
        }
    }
}

impl Animator {
    /// Advance free-run state by the given master-beat delta. Clock-locked animators carry no
    /// state of their own and are unaffected.
    pub fn advance(&mut self, dt_beats: f64) {
        if self.clock_source == ClockSource::FreeRun {
            self.free_phase = wrap_phase(self.free_phase + self.speed * dt_beats);
        }
    }

    /// Reset the free-run phase accumulator back to zero.
    pub fn reset_phase(&mut self) {
        self.free_phase = 0.0;
    }

    /// Shift the free-run phase accumulator by the given amount.
    pub fn nudge_phase(&mut self, amount: f64) {
        self.free_phase = wrap_phase(self.free_phase + amount);
    }

    /// The phase this animator currently evaluates its waveform at.
    pub fn phase(&self, clocks: &MasterClock) -> f64 {
        let phase = match self.clock_source {
            ClockSource::Master => self.speed * clocks.master().phase(),
            ClockSource::Aux(index) => self.speed * clocks.aux(index).phase(),
            ClockSource::FreeRun => self.free_phase,
        };
        wrap_phase(phase + self.phase_offset)
    }

    /// Evaluate the animator against the current clock phases.
    pub fn value(&self, clocks: &MasterClock) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        self.weight
            * self
                .waveform
                .value(self.phase(clocks), self.smoothing, self.duty_cycle, self.pulse)
    }
}

// -------------------------------------------------------------------------------------------------

/// One bank slot: an animator plus its routing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimatorSlot {
    pub animator: Animator,
    /// The parameter this slot modulates. `None` is identity: the slot is skipped.
    pub target: Option<AnimationTarget>,
    pub mix: MixMode,
}

// -------------------------------------------------------------------------------------------------

/// Per-target modulation values produced by one bank evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModulationTable {
    values: [f64; TARGET_COUNT],
}

impl Default for ModulationTable {
    fn default() -> Self {
        Self {
            values: [0.0; TARGET_COUNT],
        }
    }
}

impl ModulationTable {
    /// The accumulated modulation for the given target.
    #[inline]
    pub fn get(&self, target: AnimationTarget) -> f64 {
        self.values[target.index()]
    }

    fn accumulate(&mut self, target: AnimationTarget, mix: MixMode, value: f64) {
        let slot = &mut self.values[target.index()];
        *slot = match mix {
            MixMode::Sum => *slot + value,
            MixMode::Max => slot.max(value),
            MixMode::Multiply => *slot * value,
        };
    }
}

// -------------------------------------------------------------------------------------------------

/// A fixed bank of [`ANIMATOR_COUNT`] animator slots owned by a beam.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnimatorBank {
    slots: [AnimatorSlot; ANIMATOR_COUNT],
}

impl AnimatorBank {
    pub fn slots(&self) -> &[AnimatorSlot] {
        &self.slots
    }

    /// Access a slot by index; indices wrap into the fixed bank size, so controller banks can
    /// cycle without bounds handling at every call site.
    pub fn slot(&self, index: usize) -> &AnimatorSlot {
        &self.slots[index % ANIMATOR_COUNT]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut AnimatorSlot {
        &mut self.slots[index % ANIMATOR_COUNT]
    }

    /// Advance all free-running animators.
    pub fn advance(&mut self, dt_beats: f64) {
        for slot in &mut self.slots {
            slot.animator.advance(dt_beats);
        }
    }

    /// Evaluate all slots into a fresh modulation table. Slots with no target or zero weight
    /// produce identity modulation.
    pub fn evaluate(&self, clocks: &MasterClock) -> ModulationTable {
        let mut table = ModulationTable::default();
        for slot in &self.slots {
            let Some(target) = slot.target else {
                continue;
            };
            if slot.animator.weight <= 0.0 {
                continue;
            }
            table.accumulate(target, slot.mix, slot.animator.value(clocks));
        }
        table
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strum::VariantArray;

    use super::*;
    use crate::clock::MasterClock;
    use crate::utils::assert_eq_with_epsilon;

    fn clocks_at(phase: f64) -> MasterClock {
        let mut clocks = MasterClock::default();
        clocks.master_mut().set_phase(phase);
        clocks
    }

    #[test]
    fn zero_weight_slots_are_identity() {
        let mut bank = AnimatorBank::default();
        for (index, slot) in (0..ANIMATOR_COUNT).zip([
            (WaveformKind::Sine, 0.0, false),
            (WaveformKind::Square, 0.3, true),
            (WaveformKind::Triangle, 0.5, false),
            (WaveformKind::Sawtooth, 0.1, true),
        ]) {
            let slot_ref = bank.slot_mut(index);
            slot_ref.target = Some(AnimationTarget::Thickness);
            slot_ref.animator.waveform = slot.0;
            slot_ref.animator.smoothing = slot.1;
            slot_ref.animator.pulse = slot.2;
            slot_ref.animator.speed = 1.0;
            slot_ref.animator.weight = 0.0;
        }
        for phase in (0..100).map(|step| step as f64 / 100.0) {
            let table = bank.evaluate(&clocks_at(phase));
            for target in AnimationTarget::VARIANTS {
                assert_eq!(table.get(*target), 0.0);
            }
        }
    }

    #[test]
    fn untargeted_slots_are_skipped() {
        let mut bank = AnimatorBank::default();
        bank.slot_mut(0).animator.weight = 1.0;
        bank.slot_mut(0).animator.speed = 1.0;
        let table = bank.evaluate(&clocks_at(0.25));
        for target in AnimationTarget::VARIANTS {
            assert_eq!(table.get(*target), 0.0);
        }
    }

    #[test]
    fn weight_scales_output() {
        let mut bank = AnimatorBank::default();
        let slot = bank.slot_mut(0);
        slot.target = Some(AnimationTarget::Size);
        slot.animator.speed = 1.0;
        slot.animator.weight = 0.5;
        // sine peaks at quarter phase
        let table = bank.evaluate(&clocks_at(0.25));
        assert_eq_with_epsilon!(table.get(AnimationTarget::Size), 0.5, 1e-9);
    }

    #[test]
    fn same_target_sums() {
        let mut bank = AnimatorBank::default();
        for index in 0..2 {
            let slot = bank.slot_mut(index);
            slot.target = Some(AnimationTarget::ColCenter);
            slot.animator.speed = 1.0;
            slot.animator.weight = 1.0;
        }
        let table = bank.evaluate(&clocks_at(0.25));
        assert_eq_with_epsilon!(table.get(AnimationTarget::ColCenter), 2.0, 1e-9);
    }

    #[test]
    fn max_and_multiply_mix_modes() {
        let mut bank = AnimatorBank::default();
        let first = bank.slot_mut(0);
        first.target = Some(AnimationTarget::Thickness);
        first.animator.speed = 1.0;
        first.animator.weight = 1.0;
        let second = bank.slot_mut(1);
        second.target = Some(AnimationTarget::Thickness);
        second.animator.speed = 1.0;
        second.animator.weight = 0.25;
        second.mix = MixMode::Max;
        // both peak at quarter phase: max(1.0, 0.25) == 1.0
        let table = bank.evaluate(&clocks_at(0.25));
        assert_eq_with_epsilon!(table.get(AnimationTarget::Thickness), 1.0, 1e-9);

        bank.slot_mut(1).mix = MixMode::Multiply;
        let table = bank.evaluate(&clocks_at(0.25));
        assert_eq_with_epsilon!(table.get(AnimationTarget::Thickness), 0.25, 1e-9);

        // a lone multiply slot contributes nothing
        bank.slot_mut(0).target = None;
        let table = bank.evaluate(&clocks_at(0.25));
        assert_eq!(table.get(AnimationTarget::Thickness), 0.0);
    }

    #[test]
    fn free_run_accumulates_independent_phase() {
        let mut animator = Animator {
            speed: 1.0,
            weight: 1.0,
            clock_source: ClockSource::FreeRun,
            ..Animator::default()
        };
        let clocks = clocks_at(0.9); // clock phase must not matter
        assert_eq!(animator.phase(&clocks), 0.0);
        for _ in 0..25 {
            animator.advance(0.01);
        }
        assert_eq_with_epsilon!(animator.phase(&clocks), 0.25, 1e-9);
        animator.reset_phase();
        assert_eq!(animator.phase(&clocks), 0.0);
    }

    #[test]
    fn clock_locked_phase_follows_speed_and_offset() {
        let mut animator = Animator {
            speed: 2.0,
            weight: 1.0,
            phase_offset: 0.25,
            ..Animator::default()
        };
        assert_eq_with_epsilon!(animator.phase(&clocks_at(0.5)), 0.25, 1e-9);
        animator.speed = -1.0;
        assert_eq_with_epsilon!(animator.phase(&clocks_at(0.5)), 0.75, 1e-9);
    }
}
