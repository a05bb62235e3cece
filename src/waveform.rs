//! Pure waveform functions for the animation engine.

use serde::{Deserialize, Serialize};

use crate::utils::wrap_phase;

// -------------------------------------------------------------------------------------------------

/// Waveform shapes selectable per animator.
#[derive(
    Debug,
    Default,
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
pub enum WaveformKind {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl WaveformKind {
    /// Evaluate this waveform at the given phase.
    ///
    /// `phase` may be any real value and is taken modulo 1. `smoothing` (clamped to `[0, 0.5]`)
    /// widens the transitions of the discontinuous shapes, `duty_cycle` (clamped to `[0, 1]`)
    /// compresses the wave into the leading portion of the cycle and gates the rest to zero, and
    /// `pulse` remaps the bipolar wave into its unipolar `[0, 1]` variant.
    ///
    /// Output is in `[-1, 1]`, or `[0, 1]` when `pulse` is set. These functions are stateless and
    /// allocation free; the tick loop calls them for every animator of every beam on every frame.
    pub fn value(&self, phase: f64, smoothing: f64, duty_cycle: f64, pulse: bool) -> f64 {
        let phase = wrap_phase(phase);
        let duty_cycle = duty_cycle.clamp(0.0, 1.0);
        if duty_cycle <= 0.0 || phase > duty_cycle {
            return 0.0;
        }
        // compress the wave into the active portion; the quotient can land exactly on 1.0
        let phase = wrap_phase(phase / duty_cycle);
        let smoothing = smoothing.clamp(0.0, 0.5);
        match self {
            Self::Sine => sine(phase, pulse),
            Self::Triangle => triangle(phase, pulse),
            Self::Square => square(phase, smoothing, pulse),
            Self::Sawtooth => sawtooth(phase, smoothing, pulse),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Remaps a bipolar `[-1, 1]` wave value into its unipolar `[0, 1]` pulse variant.
#[inline]
fn unipolar(value: f64) -> f64 {
    (value + 1.0) / 2.0
}

fn sine(phase: f64, pulse: bool) -> f64 {
    use std::f64::consts::TAU;
    if pulse {
        // half-offset so the pulse starts and ends the cycle at zero
        (f64::sin(TAU * (phase - 0.25)) + 1.0) / 2.0
    } else {
        f64::sin(TAU * phase)
    }
}

fn triangle(phase: f64, pulse: bool) -> f64 {
    let value = if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    };
    if pulse {
        unipolar(value)
    } else {
        value
    }
}

fn square(phase: f64, smoothing: f64, pulse: bool) -> f64 {
    let value = if smoothing <= 0.0 {
        if phase < 0.5 {
            1.0
        } else {
            -1.0
        }
    } else if phase < smoothing {
        // rising edge at the cycle start
        phase / smoothing
    } else if phase < 0.5 - smoothing {
        1.0
    } else if phase < 0.5 + smoothing {
        // falling edge at the half cycle
        (0.5 - phase) / smoothing
    } else if phase < 1.0 - smoothing {
        -1.0
    } else {
        // rising edge back towards the cycle end
        (phase - 1.0) / smoothing
    };
    if pulse {
        unipolar(value)
    } else {
        value
    }
}

fn sawtooth(phase: f64, smoothing: f64, pulse: bool) -> f64 {
    let value = if smoothing <= 0.0 || (phase - 0.5).abs() > smoothing {
        if phase < 0.5 {
            2.0 * phase
        } else {
            2.0 * phase - 2.0
        }
    } else {
        // linear ramp across the half-cycle discontinuity
        (0.5 - phase) / smoothing * (1.0 - 2.0 * smoothing)
    };
    if pulse {
        unipolar(value)
    } else {
        value
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use strum::VariantArray;

    use super::*;
    use crate::utils::assert_eq_with_epsilon;

    fn phases() -> impl Iterator<Item = f64> {
        (0..500).map(|step| step as f64 / 500.0)
    }

    #[test]
    fn periodicity() {
        // smoothing keeps every shape continuous, so float rounding of the shifted phase
        // cannot jump a hard edge
        for kind in WaveformKind::VARIANTS {
            for phase in phases() {
                for pulse in [false, true] {
                    assert_eq_with_epsilon!(
                        kind.value(phase, 0.1, 1.0, pulse),
                        kind.value(phase + 1.0, 0.1, 1.0, pulse),
                        1e-9
                    );
                    assert_eq_with_epsilon!(
                        kind.value(phase, 0.1, 1.0, pulse),
                        kind.value(phase - 3.0, 0.1, 1.0, pulse),
                        1e-9
                    );
                }
            }
        }
    }

    #[test]
    fn output_ranges() {
        for kind in WaveformKind::VARIANTS {
            for phase in phases() {
                for smoothing in [0.0, 0.05, 0.25, 0.5] {
                    for duty_cycle in [0.3, 0.7, 1.0] {
                        let bipolar = kind.value(phase, smoothing, duty_cycle, false);
                        assert!(
                            (-1.0..=1.0).contains(&bipolar),
                            "{kind} at {phase} out of range: {bipolar}"
                        );
                        let pulsed = kind.value(phase, smoothing, duty_cycle, true);
                        assert!(
                            (0.0..=1.0).contains(&pulsed),
                            "{kind} pulse at {phase} out of range: {pulsed}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn zero_duty_cycle_gates_everything() {
        for kind in WaveformKind::VARIANTS {
            for phase in phases() {
                assert_eq!(kind.value(phase, 0.0, 0.0, false), 0.0);
                assert_eq!(kind.value(phase, 0.3, 0.0, true), 0.0);
            }
        }
    }

    #[test]
    fn neutral_parameters_yield_bare_waves() {
        use std::f64::consts::TAU;
        for phase in phases() {
            assert_eq_with_epsilon!(
                WaveformKind::Sine.value(phase, 0.0, 1.0, false),
                f64::sin(TAU * phase),
                1e-9
            );
        }
        // square without smoothing transitions hard at the half cycle
        assert_eq!(WaveformKind::Square.value(0.25, 0.0, 1.0, false), 1.0);
        assert_eq!(WaveformKind::Square.value(0.75, 0.0, 1.0, false), -1.0);
        // sawtooth rises to its peak just before the half cycle
        assert_eq_with_epsilon!(WaveformKind::Sawtooth.value(0.4999, 0.0, 1.0, false), 1.0, 1e-3);
        assert_eq_with_epsilon!(WaveformKind::Sawtooth.value(0.5, 0.0, 1.0, false), -1.0, 1e-9);
    }

    #[test]
    fn triangle_zero_crossings() {
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.25, 0.0, 1.0, false), 0.0, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.75, 0.0, 1.0, false), 0.0, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.0, 0.0, 1.0, false), -1.0, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.5, 0.0, 1.0, false), 1.0, 1e-9);
        // pulse variant peaks unipolar at the half cycle
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.5, 0.0, 1.0, true), 1.0, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Triangle.value(0.0, 0.0, 1.0, true), 0.0, 1e-9);
    }

    #[test]
    fn duty_cycle_compresses_the_wave() {
        // with duty 0.5 the full cycle plays out over the first half, the rest is gated
        assert_eq_with_epsilon!(
            WaveformKind::Triangle.value(0.25, 0.0, 0.5, false),
            WaveformKind::Triangle.value(0.5, 0.0, 1.0, false),
            1e-9
        );
        assert_eq!(WaveformKind::Triangle.value(0.75, 0.0, 0.5, false), 0.0);
    }

    #[test]
    fn square_smoothing_ramps() {
        // midway down the smoothed falling edge
        assert_eq_with_epsilon!(WaveformKind::Square.value(0.5, 0.1, 1.0, false), 0.0, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Square.value(0.45, 0.1, 1.0, false), 0.5, 1e-9);
        assert_eq_with_epsilon!(WaveformKind::Square.value(0.55, 0.1, 1.0, false), -0.5, 1e-9);
        // plateau untouched
        assert_eq!(WaveformKind::Square.value(0.25, 0.1, 1.0, false), 1.0);
    }
}
