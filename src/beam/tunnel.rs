//! The tunnel beam: a parametric ring of arc segments.

use serde::{Deserialize, Serialize};

use crate::animation::{AnimationTarget, AnimatorBank};
use crate::clock::MasterClock;
use crate::draw::{ArcRecord, DrawEntity};
use crate::utils::{clamp_bipolar, clamp_unit, phase_to_f32, wrap_phase};

// -------------------------------------------------------------------------------------------------

/// Highest selectable segment count.
pub const MAX_SEGMENTS: u32 = 128;

/// Blacking knob range is `[-MAX_BLACKING, MAX_BLACKING]`.
pub const MAX_BLACKING: i32 = 8;

/// Ring radius at full size, as a screen fraction.
const SIZE_SCALE: f64 = 0.5;

/// Stroke thickness at full thickness, as a screen fraction.
const THICKNESS_SCALE: f64 = 0.25;

// -------------------------------------------------------------------------------------------------

/// An animated ring of arc segments.
///
/// All knob fields live in controller units: `[0, 1]` for unipolar knobs, `[-0.5, 0.5]` for the
/// bipolar speed knobs. Values are clamped and wrapped per parameter kind when the frame is
/// rendered, so controller writes never have to be validated on the way in. The rotation and
/// marquee angles are continuous state accumulated from their (possibly modulated) speeds each
/// tick; they belong to the tunnel, not to any clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnel {
    /// Ring rotation speed in cycles per beat, bipolar.
    pub rotation_speed: f64,
    /// Arc fill fraction of each segment slot.
    pub thickness: f64,
    /// Ring radius.
    pub size: f64,
    /// Vertical squash of the ring; 1 is circular.
    pub aspect_ratio: f64,
    /// Base hue.
    pub col_center: f64,
    /// Saturation banding depth across alternating segments.
    pub col_width: f64,
    /// Hue spread across the ring.
    pub col_spread: f64,
    pub col_saturation: f64,
    /// Number of segment slots, `1..=MAX_SEGMENTS`.
    pub segments: u32,
    /// Segment skip pattern; 0 draws everything, positive skips every `(b+1)`-th segment,
    /// negative draws only every `(|b|+1)`-th.
    pub blacking: i32,
    /// Center offset, bipolar screen fraction.
    pub position_x: f64,
    pub position_y: f64,
    /// Marquee (segment crawl) speed in cycles per beat, bipolar.
    pub marquee_speed: f64,
    pub animators: AnimatorBank,
    #[serde(skip)]
    pub(crate) rotation_phase: f64,
    #[serde(skip)]
    pub(crate) marquee_offset: f64,
}

impl Default for Tunnel {
    fn default() -> Self {
        Self {
            rotation_speed: 0.0,
            thickness: 0.25,
            size: 0.5,
            aspect_ratio: 1.0,
            col_center: 0.0,
            col_width: 0.25,
            col_spread: 0.0,
            col_saturation: 1.0,
            segments: 16,
            blacking: 0,
            position_x: 0.0,
            position_y: 0.0,
            marquee_speed: 0.0,
            animators: AnimatorBank::default(),
            rotation_phase: 0.0,
            marquee_offset: 0.0,
        }
    }
}

impl Tunnel {
    /// Advance animators and integrate the rotation and marquee angles. Modulated speeds bend
    /// the accumulated angles, which is what makes a speed-targeting animator visible.
    pub fn update(&mut self, dt_beats: f64, clocks: &MasterClock) {
        self.animators.advance(dt_beats);
        let table = self.animators.evaluate(clocks);
        let rotation_speed =
            clamp_bipolar(self.rotation_speed) + table.get(AnimationTarget::RotationSpeed);
        self.rotation_phase = wrap_phase(self.rotation_phase + rotation_speed * dt_beats);
        let marquee_speed =
            clamp_bipolar(self.marquee_speed) + table.get(AnimationTarget::MarqueeSpeed);
        self.marquee_offset = wrap_phase(self.marquee_offset + marquee_speed * dt_beats);
    }

    /// The accumulated ring rotation angle, as a phase.
    pub fn rotation_phase(&self) -> f64 {
        self.rotation_phase
    }

    /// The accumulated marquee crawl offset, as a phase.
    pub fn marquee_offset(&self) -> f64 {
        self.marquee_offset
    }

    /// Render one frame's worth of arcs at the given effective level.
    pub fn render(&self, level: f64, clocks: &MasterClock) -> DrawEntity {
        let table = self.animators.evaluate(clocks);

        // resolve the modulated parameter set, clamped or wrapped per parameter kind
        let thickness = clamp_unit(self.thickness + table.get(AnimationTarget::Thickness));
        let size = clamp_unit(self.size + table.get(AnimationTarget::Size));
        let aspect_ratio = clamp_unit(self.aspect_ratio + table.get(AnimationTarget::AspectRatio));
        let col_center = wrap_phase(self.col_center + table.get(AnimationTarget::ColCenter));
        let col_width = clamp_unit(self.col_width + table.get(AnimationTarget::ColWidth));
        let col_spread = clamp_unit(self.col_spread + table.get(AnimationTarget::ColSpread));
        let col_saturation =
            clamp_unit(self.col_saturation + table.get(AnimationTarget::ColSaturation));
        let x = clamp_bipolar(self.position_x + table.get(AnimationTarget::PositionX));
        let y = clamp_bipolar(self.position_y + table.get(AnimationTarget::PositionY));

        debug_assert!(self.segments >= 1, "tunnel with zero segments");
        let segments = if self.segments >= 1 {
            self.segments.min(MAX_SEGMENTS)
        } else {
            log::error!("Tunnel segment count is zero, drawing one segment");
            1
        };

        let level = (clamp_unit(level) * 255.0).round() as u32;
        let rad_x = (size * SIZE_SCALE) as f32;
        let rad_y = (size * SIZE_SCALE * aspect_ratio) as f32;
        let segment_width = 1.0 / f64::from(segments);

        let mut arcs = Vec::with_capacity(segments as usize);
        for index in 0..segments {
            if is_blacked(index, self.blacking) {
                continue;
            }
            let start = wrap_phase(self.marquee_offset + f64::from(index) * segment_width);
            let stop = wrap_phase(start + segment_width * thickness);
            let ramp = f64::from(index) / f64::from(segments);
            let banding = f64::from(index % 2);
            arcs.push(ArcRecord {
                level,
                thickness: (thickness * THICKNESS_SCALE) as f32,
                hue: phase_to_f32(col_center + col_spread * ramp),
                sat: clamp_unit(col_saturation * (1.0 - col_width * banding)) as f32,
                val: 255,
                x: x as f32,
                y: y as f32,
                rad_x,
                rad_y,
                start: phase_to_f32(start),
                stop: phase_to_f32(stop),
                rot_angle: phase_to_f32(self.rotation_phase),
            });
        }
        DrawEntity::Arcs(arcs)
    }
}

// -------------------------------------------------------------------------------------------------

/// Whether a segment index is masked out by the blacking pattern.
fn is_blacked(index: u32, blacking: i32) -> bool {
    let blacking = blacking.clamp(-MAX_BLACKING, MAX_BLACKING);
    match blacking.cmp(&0) {
        std::cmp::Ordering::Equal => false,
        std::cmp::Ordering::Greater => {
            let period = blacking as u32 + 1;
            index % period == period - 1
        }
        std::cmp::Ordering::Less => {
            let period = blacking.unsigned_abs() + 1;
            index % period != 0
        }
    }
}

// -------------------------------------------------------------------------------------------------
