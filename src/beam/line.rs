//! The line beam: a single straight stroke.

use serde::{Deserialize, Serialize};

use crate::draw::{DrawEntity, LineRecord};
use crate::utils::{clamp_bipolar, clamp_unit, phase_to_f32};

// -------------------------------------------------------------------------------------------------

/// Stroke thickness at full thickness, as a screen fraction.
const THICKNESS_SCALE: f64 = 0.1;

// -------------------------------------------------------------------------------------------------

/// A static straight beam. Knob fields use controller units like [`Tunnel`](super::Tunnel); the
/// start and stop phases trim the stroke along its own length, so they clamp instead of
/// wrapping (a stop of 1.0 is the full stroke, not a zero-length one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineBeam {
    pub thickness: f64,
    /// Stroke length as a fraction of the screen.
    pub length: f64,
    pub position_x: f64,
    pub position_y: f64,
    /// Orientation, as a phase.
    pub rotation: f64,
    /// Hue of the stroke.
    pub color: f64,
    pub start_phase: f64,
    pub stop_phase: f64,
}

impl Default for LineBeam {
    fn default() -> Self {
        Self {
            thickness: 0.25,
            length: 0.5,
            position_x: 0.0,
            position_y: 0.0,
            rotation: 0.0,
            color: 0.0,
            start_phase: 0.0,
            stop_phase: 1.0,
        }
    }
}

impl LineBeam {
    /// Produce the line's single draw command at the given effective level.
    pub fn render(&self, level: f64) -> DrawEntity {
        DrawEntity::Lines(vec![LineRecord {
            level: (clamp_unit(level) * 255.0).round() as u32,
            thickness: (clamp_unit(self.thickness) * THICKNESS_SCALE) as f32,
            hue: phase_to_f32(self.color),
            sat: 1.0,
            val: 255,
            x: clamp_bipolar(self.position_x) as f32,
            y: clamp_bipolar(self.position_y) as f32,
            length: clamp_unit(self.length) as f32,
            start: clamp_unit(self.start_phase) as f32,
            stop: clamp_unit(self.stop_phase) as f32,
            rot_angle: phase_to_f32(self.rotation),
        }])
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_line() {
        let line = LineBeam {
            rotation: 0.25,
            color: 0.6,
            ..LineBeam::default()
        };
        let DrawEntity::Lines(lines) = line.render(0.5) else {
            panic!("expected lines");
        };
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].level, 128);
        assert_eq!(lines[0].rot_angle, 0.25);
        assert!((lines[0].hue - 0.6).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_knobs_are_clamped() {
        let line = LineBeam {
            thickness: 3.0,
            length: -1.0,
            position_x: 2.0,
            ..LineBeam::default()
        };
        let DrawEntity::Lines(lines) = line.render(2.0) else {
            panic!("expected lines");
        };
        assert_eq!(lines[0].level, 255);
        assert_eq!(lines[0].length, 0.0);
        assert_eq!(lines[0].x, 0.5);
    }
}
