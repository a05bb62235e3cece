//! The binding table: which surface control drives which engine operation.
//!
//! Controls and targets are closed enums. Surfaces address parameters through
//! [`ControlTarget`], never through free-form strings, so a binding that survives table
//! construction can always be applied.

use std::collections::HashMap;

use crate::utils::clamp_unit;

// -------------------------------------------------------------------------------------------------

/// A physical control on a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlId {
    /// A MIDI note (pads, buttons). `channel` is the MIDI channel, 0-based.
    Note { channel: u8, note: u8 },
    /// A MIDI control change (knobs, faders).
    Control { channel: u8, control: u8 },
    /// An OSC address pattern.
    Address(String),
}

// -------------------------------------------------------------------------------------------------

/// Which clock an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    Master,
    Aux(usize),
}

// -------------------------------------------------------------------------------------------------

/// Directly settable beam parameters. Applied to the selected layer's beam; parameters a beam
/// variant does not have are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamParam {
    RotationSpeed,
    Thickness,
    Size,
    AspectRatio,
    ColCenter,
    ColWidth,
    ColSpread,
    ColSaturation,
    Segments,
    Blacking,
    PositionX,
    PositionY,
    MarqueeSpeed,
}

// -------------------------------------------------------------------------------------------------

/// Parameters of the selected animator slot of the selected layer's beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorParam {
    Waveform,
    Speed,
    Weight,
    Smoothing,
    DutyCycle,
    Pulse,
    Target,
    ClockSource,
    ResetPhase,
}

// -------------------------------------------------------------------------------------------------

/// The engine operation a control maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTarget {
    LayerSelect(usize),
    LayerLevel(usize),
    LayerBump(usize),
    LayerMask(usize),
    LayerClear(usize),
    LayerChannel { layer: usize, channel: u8 },
    BeamParam(BeamParam),
    AnimatorSelect(usize),
    AnimatorParam(AnimatorParam),
    ClockTap(ClockId),
    ClockNudge(ClockId),
    ClockRateScale(ClockId),
    /// A beam store grid pad. Recalls by default; the save/clear mode toggles below rebind the
    /// whole grid until released.
    StoreGrid { row: usize, column: usize },
    StoreSaveMode,
    StoreClearMode,
    /// Freeze the current mixer output into a look on the selected layer.
    CaptureLook,
}

// -------------------------------------------------------------------------------------------------

/// Half-width of the bipolar curve's center detent, in normalized controller units.
const DETENT: f64 = 0.05;

/// How a raw normalized controller value maps into a target's domain, and back for echoes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MappingCurve {
    /// Pass through, clamped to `[0, 1]`.
    Unit,
    /// `[0, 1]` to `[-0.5, 0.5]` with a snap detent at zero.
    Bipolar,
    /// `[0, 1]` to a step index `0..steps`.
    Stepped { steps: u32 },
    /// Buttons which fire on press; the value is the press edge.
    Trigger,
    /// Buttons which flip a boolean on press.
    Toggle,
}

impl MappingCurve {
    /// Map a raw normalized controller value into the target domain.
    pub fn apply(&self, raw: f64) -> f64 {
        let raw = clamp_unit(raw);
        match self {
            Self::Unit | Self::Trigger | Self::Toggle => raw,
            Self::Bipolar => {
                let value = raw - 0.5;
                if value.abs() < DETENT {
                    0.0
                } else {
                    value
                }
            }
            Self::Stepped { steps } => {
                let last = f64::from(steps.saturating_sub(1));
                (raw * f64::from(*steps)).floor().min(last)
            }
        }
    }

    /// Map a target-domain value back into a raw normalized value for surface echoes.
    pub fn unapply(&self, value: f64) -> f64 {
        match self {
            Self::Unit | Self::Trigger | Self::Toggle => clamp_unit(value),
            Self::Bipolar => clamp_unit(value + 0.5),
            Self::Stepped { steps } => clamp_unit((value + 0.5) / f64::from(*steps)),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// One table entry.
#[derive(Debug, Clone)]
pub struct Binding {
    pub target: ControlTarget,
    pub curve: MappingCurve,
}

// -------------------------------------------------------------------------------------------------

/// Routing table from `(surface, control)` to engine operations.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    surfaces: HashMap<String, HashMap<ControlId, Binding>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a binding.
    pub fn bind(
        &mut self,
        surface: &str,
        control: ControlId,
        target: ControlTarget,
        curve: MappingCurve,
    ) {
        self.surfaces
            .entry(surface.to_string())
            .or_default()
            .insert(control, Binding { target, curve });
    }

    pub fn unbind(&mut self, surface: &str, control: &ControlId) {
        if let Some(controls) = self.surfaces.get_mut(surface) {
            controls.remove(control);
        }
    }

    /// Resolve a surface control. Allocation free; called for every incoming event.
    pub fn lookup(&self, surface: &str, control: &ControlId) -> Option<&Binding> {
        self.surfaces.get(surface)?.get(control)
    }

    /// All bindings of one surface, for page snapshot pushes.
    pub fn surface_bindings(
        &self,
        surface: &str,
    ) -> impl Iterator<Item = (&ControlId, &Binding)> {
        self.surfaces
            .get(surface)
            .into_iter()
            .flat_map(|controls| controls.iter())
    }

    /// All bindings across all surfaces.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ControlId, &Binding)> {
        self.surfaces.iter().flat_map(|(surface, controls)| {
            controls
                .iter()
                .map(move |(control, binding)| (surface.as_str(), control, binding))
        })
    }

    pub fn len(&self) -> usize {
        self.surfaces.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stock performance layout: an APC40-style MIDI surface plus a TouchOSC tablet.
    ///
    /// MIDI map (following the APC40 factory note/CC numbers): the 5×8 clip grid drives the
    /// beam store, track selects pick mixer layers, track faders set layer levels, the device
    /// knobs edit the selected beam and the selected animator slot.
    pub fn performance_defaults(midi_surface: &str, osc_surface: &str) -> Self {
        use AnimatorParam as Anim;
        use BeamParam as Param;
        use ControlId::{Address, Control, Note};
        use ControlTarget as Target;
        use MappingCurve as Curve;

        let mut table = Self::new();

        for column in 0..8usize {
            let channel = column as u8;
            // clip grid pads, one column per track channel
            for row in 0..5usize {
                table.bind(
                    midi_surface,
                    Note {
                        channel,
                        note: 53 + row as u8,
                    },
                    Target::StoreGrid { row, column },
                    Curve::Trigger,
                );
            }
            // track select, activator (bump), solo (mask) and record-arm (clear) rows
            table.bind(
                midi_surface,
                Note { channel, note: 51 },
                Target::LayerSelect(column),
                Curve::Trigger,
            );
            table.bind(
                midi_surface,
                Note { channel, note: 50 },
                Target::LayerBump(column),
                Curve::Trigger,
            );
            table.bind(
                midi_surface,
                Note { channel, note: 49 },
                Target::LayerMask(column),
                Curve::Toggle,
            );
            table.bind(
                midi_surface,
                Note { channel, note: 48 },
                Target::LayerClear(column),
                Curve::Trigger,
            );
            // track fader
            table.bind(
                midi_surface,
                Control { channel, control: 7 },
                Target::LayerLevel(column),
                Curve::Unit,
            );
        }

        // scene launch column doubles as the store mode switches
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 82,
            },
            Target::StoreSaveMode,
            Curve::Toggle,
        );
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 83,
            },
            Target::StoreClearMode,
            Curve::Toggle,
        );

        // device knobs: selected beam geometry and color
        let device_knobs = [
            (16, Param::RotationSpeed, Curve::Bipolar),
            (17, Param::Thickness, Curve::Unit),
            (18, Param::Size, Curve::Unit),
            (19, Param::AspectRatio, Curve::Unit),
            (20, Param::ColCenter, Curve::Unit),
            (21, Param::ColWidth, Curve::Unit),
            (22, Param::ColSpread, Curve::Unit),
            (23, Param::ColSaturation, Curve::Unit),
        ];
        for (control, param, curve) in device_knobs {
            table.bind(
                midi_surface,
                Control {
                    channel: 0,
                    control,
                },
                Target::BeamParam(param),
                curve,
            );
        }
        table.bind(
            midi_surface,
            Control {
                channel: 0,
                control: 24,
            },
            Target::BeamParam(Param::Segments),
            Curve::Stepped { steps: 128 },
        );
        table.bind(
            midi_surface,
            Control {
                channel: 0,
                control: 25,
            },
            Target::BeamParam(Param::Blacking),
            Curve::Stepped { steps: 17 },
        );
        table.bind(
            midi_surface,
            Control {
                channel: 0,
                control: 26,
            },
            Target::BeamParam(Param::MarqueeSpeed),
            Curve::Bipolar,
        );

        // animator bank: slot select buttons plus the slot's parameter knobs
        for slot in 0..4usize {
            table.bind(
                midi_surface,
                Note {
                    channel: 0,
                    note: 58 + slot as u8,
                },
                Target::AnimatorSelect(slot),
                Curve::Trigger,
            );
        }
        let animator_knobs = [
            (48, Anim::Speed, Curve::Bipolar),
            (49, Anim::Weight, Curve::Unit),
            (50, Anim::Smoothing, Curve::Unit),
            (51, Anim::DutyCycle, Curve::Unit),
            (52, Anim::Waveform, Curve::Stepped { steps: 4 }),
            (53, Anim::Target, Curve::Stepped { steps: 12 }),
            (54, Anim::ClockSource, Curve::Stepped { steps: 6 }),
        ];
        for (control, param, curve) in animator_knobs {
            table.bind(
                midi_surface,
                Control {
                    channel: 0,
                    control,
                },
                Target::AnimatorParam(param),
                curve,
            );
        }
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 62,
            },
            Target::AnimatorParam(Anim::Pulse),
            Curve::Toggle,
        );
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 63,
            },
            Target::AnimatorParam(Anim::ResetPhase),
            Curve::Trigger,
        );

        // transport: tap tempo, phase nudge, rate scale, look capture
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 99,
            },
            Target::ClockTap(ClockId::Master),
            Curve::Trigger,
        );
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 98,
            },
            Target::ClockNudge(ClockId::Master),
            Curve::Trigger,
        );
        table.bind(
            midi_surface,
            Control {
                channel: 0,
                control: 14,
            },
            Target::ClockRateScale(ClockId::Master),
            Curve::Unit,
        );
        table.bind(
            midi_surface,
            Note {
                channel: 0,
                note: 96,
            },
            Target::CaptureLook,
            Curve::Trigger,
        );
        for aux in 0..4usize {
            table.bind(
                midi_surface,
                Note {
                    channel: 0,
                    note: 100 + aux as u8,
                },
                Target::ClockTap(ClockId::Aux(aux)),
                Curve::Trigger,
            );
        }

        // the tablet mirrors layer levels and the beam knobs under readable addresses
        for layer in 0..8usize {
            table.bind(
                osc_surface,
                Address(format!("/layer/{layer}/level")),
                Target::LayerLevel(layer),
                Curve::Unit,
            );
            table.bind(
                osc_surface,
                Address(format!("/layer/{layer}/select")),
                Target::LayerSelect(layer),
                Curve::Trigger,
            );
            table.bind(
                osc_surface,
                Address(format!("/layer/{layer}/bump")),
                Target::LayerBump(layer),
                Curve::Trigger,
            );
        }
        let osc_params = [
            ("/beam/rotation_speed", Param::RotationSpeed, Curve::Bipolar),
            ("/beam/thickness", Param::Thickness, Curve::Unit),
            ("/beam/size", Param::Size, Curve::Unit),
            ("/beam/aspect_ratio", Param::AspectRatio, Curve::Unit),
            ("/beam/col_center", Param::ColCenter, Curve::Unit),
            ("/beam/col_width", Param::ColWidth, Curve::Unit),
            ("/beam/col_spread", Param::ColSpread, Curve::Unit),
            ("/beam/col_saturation", Param::ColSaturation, Curve::Unit),
            ("/beam/marquee_speed", Param::MarqueeSpeed, Curve::Bipolar),
            ("/beam/position_x", Param::PositionX, Curve::Bipolar),
            ("/beam/position_y", Param::PositionY, Curve::Bipolar),
        ];
        for (address, param, curve) in osc_params {
            table.bind(
                osc_surface,
                Address(address.to_string()),
                Target::BeamParam(param),
                curve,
            );
        }
        table.bind(
            osc_surface,
            Address("/clock/tap".to_string()),
            Target::ClockTap(ClockId::Master),
            Curve::Trigger,
        );

        table
    }
}

// -------------------------------------------------------------------------------------------------
