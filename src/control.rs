//! The control plane: routing controller events into scene mutations and echoing state back.
//!
//! Controller edges (MIDI, OSC) decode device traffic into [`ControlEvent`]s on their own
//! threads and enqueue them; the tick thread drains the queue at the start of every tick and
//! applies the events here, under exclusive access to the scene. Echo updates flow the other
//! way through a feedback queue drained by the output thread, which may block on device writes
//! without ever touching scene state.

pub(crate) mod bindings;
pub(crate) mod midi;
pub(crate) mod osc;

use std::time::Instant;

use crossbeam_channel::Sender;
use strum::VariantArray;

pub use bindings::{
    AnimatorParam, BeamParam, Binding, BindingTable, ClockId, ControlId, ControlTarget,
    MappingCurve,
};
pub use midi::{MidiFeedback, MidiInputHandle};
pub use osc::{OscFeedback, OscServer};

use crate::animation::{AnimationTarget, ClockSource, ANIMATOR_COUNT};
use crate::beam::Beam;
use crate::clock::{Clock, MasterClock, AUX_CLOCK_COUNT};
use crate::mixer::Mixer;
use crate::store::BeamStore;
use crate::utils::LogThrottle;
use crate::waveform::WaveformKind;

// -------------------------------------------------------------------------------------------------

/// A decoded controller event, normalized across transports.
///
/// `value` is in `[0, 1]`: knob and fader positions map linearly, button presses arrive as 1.0
/// and releases as 0.0. The timestamp is taken at decode time so tap tempo stays accurate even
/// when events wait a tick in the queue.
#[derive(Debug, Clone)]
pub struct ControlEvent {
    pub surface: String,
    pub control: ControlId,
    pub value: f64,
    pub at: Instant,
}

impl ControlEvent {
    pub fn new(surface: impl Into<String>, control: ControlId, value: f64) -> Self {
        Self {
            surface: surface.into(),
            control,
            value,
            at: Instant::now(),
        }
    }

    /// Whether this event is a button press edge.
    fn is_press(&self) -> bool {
        self.value > 0.5
    }
}

// -------------------------------------------------------------------------------------------------

/// A state echo pushed back to surfaces after a mutation (LED states, value mirrors).
#[derive(Debug, Clone)]
pub struct ControlUpdate {
    /// Receiving surface; `None` broadcasts to every connected surface.
    pub surface: Option<String>,
    pub control: ControlId,
    /// Raw normalized value, already mapped back through the binding's curve.
    pub value: f64,
}

// -------------------------------------------------------------------------------------------------

/// Routes controller events into scene mutations.
///
/// The mapper also owns the controller-local page and bank state: which mixer layer and which
/// animator slot the editing controls currently address. Page changes are not scene mutations;
/// they re-send a full page snapshot so every surface shows the new page.
pub struct ControlMapper {
    bindings: BindingTable,
    selected_layer: usize,
    selected_animator: usize,
    store_save_mode: bool,
    store_clear_mode: bool,
    feedback: Sender<ControlUpdate>,
    feedback_throttle: LogThrottle,
    discarded_events: u64,
}

impl ControlMapper {
    pub fn new(bindings: BindingTable, feedback: Sender<ControlUpdate>) -> Self {
        Self {
            bindings,
            selected_layer: 0,
            selected_animator: 0,
            store_save_mode: false,
            store_clear_mode: false,
            feedback,
            feedback_throttle: LogThrottle::once_per_minute(),
            discarded_events: 0,
        }
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Replace the binding table. Takes effect for the next drained event.
    pub fn set_bindings(&mut self, bindings: BindingTable) {
        self.bindings = bindings;
    }

    pub fn selected_layer(&self) -> usize {
        self.selected_layer
    }

    pub fn selected_animator(&self) -> usize {
        self.selected_animator
    }

    /// Events that did not resolve to any binding.
    pub fn discarded_events(&self) -> u64 {
        self.discarded_events
    }

    /// Apply one controller event to the scene. Called from the tick thread only.
    pub fn apply(
        &mut self,
        event: &ControlEvent,
        mixer: &mut Mixer,
        clocks: &mut MasterClock,
        store: &mut BeamStore,
    ) {
        let Some(binding) = self.bindings.lookup(&event.surface, &event.control) else {
            self.discarded_events += 1;
            log::debug!("Unbound control {:?} on '{}'", event.control, event.surface);
            return;
        };
        let (target, curve) = (binding.target, binding.curve);
        let value = curve.apply(event.value);

        match target {
            ControlTarget::LayerSelect(layer) => {
                if event.is_press() {
                    self.selected_layer = layer.min(mixer.layer_count().saturating_sub(1));
                    self.push_page_snapshot(mixer, clocks);
                }
            }
            ControlTarget::LayerLevel(layer) => {
                if let Some(layer_ref) = mixer.layer_mut(layer) {
                    layer_ref.level = value;
                    self.echo(&event.control, curve.unapply(value));
                }
            }
            ControlTarget::LayerBump(layer) => {
                if event.is_press() {
                    if let Some(layer_ref) = mixer.layer_mut(layer) {
                        layer_ref.bump();
                    }
                }
            }
            ControlTarget::LayerMask(layer) => {
                if event.is_press() {
                    if let Some(layer_ref) = mixer.layer_mut(layer) {
                        layer_ref.mask = !layer_ref.mask;
                        let mask = layer_ref.mask;
                        self.echo(&event.control, if mask { 1.0 } else { 0.0 });
                    }
                }
            }
            ControlTarget::LayerClear(layer) => {
                if event.is_press() {
                    if let Some(layer_ref) = mixer.layer_mut(layer) {
                        layer_ref.clear();
                    }
                }
            }
            ControlTarget::LayerChannel { layer, channel } => {
                if event.is_press() {
                    if let Some(layer_ref) = mixer.layer_mut(layer) {
                        layer_ref.channels.toggle(channel);
                    }
                }
            }
            ControlTarget::BeamParam(param) => {
                if let Some(layer_ref) = mixer.layer_mut(self.selected_layer) {
                    if let Some(beam) = layer_ref.beam_mut() {
                        apply_beam_param(beam, param, value);
                        self.echo(&event.control, curve.unapply(value));
                    }
                }
            }
            ControlTarget::AnimatorSelect(slot) => {
                if event.is_press() {
                    self.selected_animator = slot % ANIMATOR_COUNT;
                    self.push_page_snapshot(mixer, clocks);
                }
            }
            ControlTarget::AnimatorParam(param) => {
                let slot_index = self.selected_animator;
                if let Some(layer_ref) = mixer.layer_mut(self.selected_layer) {
                    if let Some(bank) = layer_ref.beam_mut().and_then(Beam::animators_mut) {
                        apply_animator_param(bank.slot_mut(slot_index), param, value, event);
                        self.echo(&event.control, curve.unapply(value));
                    }
                }
            }
            ControlTarget::ClockTap(id) => {
                if event.is_press() {
                    clock_mut(clocks, id).tap(event.at);
                }
            }
            ControlTarget::ClockNudge(id) => {
                if event.is_press() {
                    clock_mut(clocks, id).nudge();
                }
            }
            ControlTarget::ClockRateScale(id) => {
                // unit knob spans a 0..2x rate scale, center is unity
                clock_mut(clocks, id).set_rate_scale(value * 2.0);
                self.echo(&event.control, curve.unapply(value));
            }
            ControlTarget::StoreGrid { row, column } => {
                if event.is_press() {
                    self.apply_store_grid(row, column, mixer, store);
                }
            }
            ControlTarget::StoreSaveMode => {
                if event.is_press() {
                    self.store_save_mode = !self.store_save_mode;
                    self.store_clear_mode = false;
                    let on = self.store_save_mode;
                    self.echo(&event.control, if on { 1.0 } else { 0.0 });
                }
            }
            ControlTarget::StoreClearMode => {
                if event.is_press() {
                    self.store_clear_mode = !self.store_clear_mode;
                    self.store_save_mode = false;
                    let on = self.store_clear_mode;
                    self.echo(&event.control, if on { 1.0 } else { 0.0 });
                }
            }
            ControlTarget::CaptureLook => {
                if event.is_press() {
                    let look = mixer.capture_look(0);
                    if let Some(layer_ref) = mixer.layer_mut(self.selected_layer) {
                        layer_ref.set_beam(look.into());
                    }
                }
            }
        }
    }

    fn apply_store_grid(
        &mut self,
        row: usize,
        column: usize,
        mixer: &mut Mixer,
        store: &mut BeamStore,
    ) {
        if self.store_clear_mode {
            if let Err(err) = store.clear(row, column) {
                log::warn!("Store clear failed: {err}");
            }
        } else if self.store_save_mode {
            let beam = mixer
                .layer(self.selected_layer)
                .and_then(|layer| layer.beam().cloned());
            if let Some(beam) = beam {
                if let Err(err) = store.save(row, column, beam) {
                    log::warn!("Store save failed: {err}");
                }
            }
        } else {
            match store.recall(row, column) {
                Ok(Some(beam)) => {
                    if let Some(layer_ref) = mixer.layer_mut(self.selected_layer) {
                        layer_ref.set_beam(beam);
                    }
                }
                Ok(None) => {}
                Err(err) => log::warn!("Store recall failed: {err}"),
            }
        }
    }

    /// Queue a broadcast echo. A full feedback queue drops the echo; surfaces resync on the
    /// next page snapshot.
    fn echo(&mut self, control: &ControlId, value: f64) {
        let update = ControlUpdate {
            surface: None,
            control: control.clone(),
            value,
        };
        if self.feedback.try_send(update).is_err() && self.feedback_throttle.allow() {
            log::warn!("Surface feedback queue is full, dropping echo updates");
        }
    }

    /// Push the full state of the active page to every bound surface, so page flips land all
    /// LEDs and value displays at once.
    pub fn push_page_snapshot(&mut self, mixer: &Mixer, clocks: &MasterClock) {
        let mut updates = Vec::new();
        for (surface, control, binding) in self.bindings.iter() {
            if let Some(value) = self.current_value(binding.target, mixer, clocks) {
                updates.push(ControlUpdate {
                    surface: Some(surface.to_string()),
                    control: control.clone(),
                    value: binding.curve.unapply(value),
                });
            }
        }
        for update in updates {
            if self.feedback.try_send(update).is_err() {
                if self.feedback_throttle.allow() {
                    log::warn!("Surface feedback queue is full, dropping page snapshot");
                }
                break;
            }
        }
    }

    /// The current domain value behind a target, for echoes. Targets without readable state
    /// (triggers) report nothing.
    fn current_value(
        &self,
        target: ControlTarget,
        mixer: &Mixer,
        clocks: &MasterClock,
    ) -> Option<f64> {
        match target {
            ControlTarget::LayerSelect(layer) => {
                Some(if layer == self.selected_layer { 1.0 } else { 0.0 })
            }
            ControlTarget::LayerLevel(layer) => Some(mixer.layer(layer)?.level),
            ControlTarget::LayerMask(layer) => {
                Some(if mixer.layer(layer)?.mask { 1.0 } else { 0.0 })
            }
            ControlTarget::BeamParam(param) => {
                let beam = mixer.layer(self.selected_layer)?.beam()?;
                read_beam_param(beam, param)
            }
            ControlTarget::AnimatorSelect(slot) => {
                Some(if slot == self.selected_animator { 1.0 } else { 0.0 })
            }
            ControlTarget::AnimatorParam(param) => {
                let beam = mixer.layer(self.selected_layer)?.beam()?;
                read_animator_param(beam.animators()?.slot(self.selected_animator), param)
            }
            ControlTarget::ClockRateScale(id) => Some(clock_ref(clocks, id).rate_scale() / 2.0),
            ControlTarget::StoreSaveMode => Some(if self.store_save_mode { 1.0 } else { 0.0 }),
            ControlTarget::StoreClearMode => Some(if self.store_clear_mode { 1.0 } else { 0.0 }),
            ControlTarget::LayerBump(_)
            | ControlTarget::LayerClear(_)
            | ControlTarget::LayerChannel { .. }
            | ControlTarget::ClockTap(_)
            | ControlTarget::ClockNudge(_)
            | ControlTarget::StoreGrid { .. }
            | ControlTarget::CaptureLook => None,
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn clock_mut(clocks: &mut MasterClock, id: ClockId) -> &mut Clock {
    match id {
        ClockId::Master => clocks.master_mut(),
        ClockId::Aux(index) => clocks.aux_mut(index % AUX_CLOCK_COUNT),
    }
}

fn clock_ref(clocks: &MasterClock, id: ClockId) -> &Clock {
    match id {
        ClockId::Master => clocks.master(),
        ClockId::Aux(index) => clocks.aux(index % AUX_CLOCK_COUNT),
    }
}

/// Write a mapped value into the parameter of whichever beam variant is selected. Parameters a
/// variant does not carry are ignored, so one knob row can drive mixed layer contents.
fn apply_beam_param(beam: &mut Beam, param: BeamParam, value: f64) {
    match beam {
        Beam::Tunnel(tunnel) => match param {
            BeamParam::RotationSpeed => tunnel.rotation_speed = value,
            BeamParam::Thickness => tunnel.thickness = value,
            BeamParam::Size => tunnel.size = value,
            BeamParam::AspectRatio => tunnel.aspect_ratio = value,
            BeamParam::ColCenter => tunnel.col_center = value,
            BeamParam::ColWidth => tunnel.col_width = value,
            BeamParam::ColSpread => tunnel.col_spread = value,
            BeamParam::ColSaturation => tunnel.col_saturation = value,
            BeamParam::Segments => tunnel.segments = (value as u32 + 1).min(crate::beam::tunnel::MAX_SEGMENTS),
            BeamParam::Blacking => {
                tunnel.blacking = value as i32 - crate::beam::tunnel::MAX_BLACKING
            }
            BeamParam::PositionX => tunnel.position_x = value,
            BeamParam::PositionY => tunnel.position_y = value,
            BeamParam::MarqueeSpeed => tunnel.marquee_speed = value,
        },
        Beam::Line(line) => match param {
            BeamParam::Thickness => line.thickness = value,
            BeamParam::Size => line.length = value,
            BeamParam::ColCenter => line.color = value,
            BeamParam::RotationSpeed => line.rotation = value + 0.5,
            BeamParam::PositionX => line.position_x = value,
            BeamParam::PositionY => line.position_y = value,
            _ => {}
        },
        Beam::Look(_) => {}
    }
}

fn read_beam_param(beam: &Beam, param: BeamParam) -> Option<f64> {
    match beam {
        Beam::Tunnel(tunnel) => Some(match param {
            BeamParam::RotationSpeed => tunnel.rotation_speed,
            BeamParam::Thickness => tunnel.thickness,
            BeamParam::Size => tunnel.size,
            BeamParam::AspectRatio => tunnel.aspect_ratio,
            BeamParam::ColCenter => tunnel.col_center,
            BeamParam::ColWidth => tunnel.col_width,
            BeamParam::ColSpread => tunnel.col_spread,
            BeamParam::ColSaturation => tunnel.col_saturation,
            BeamParam::Segments => f64::from(tunnel.segments.saturating_sub(1)),
            BeamParam::Blacking => f64::from(tunnel.blacking + crate::beam::tunnel::MAX_BLACKING),
            BeamParam::PositionX => tunnel.position_x,
            BeamParam::PositionY => tunnel.position_y,
            BeamParam::MarqueeSpeed => tunnel.marquee_speed,
        }),
        Beam::Line(line) => match param {
            BeamParam::Thickness => Some(line.thickness),
            BeamParam::Size => Some(line.length),
            BeamParam::ColCenter => Some(line.color),
            BeamParam::RotationSpeed => Some(line.rotation - 0.5),
            BeamParam::PositionX => Some(line.position_x),
            BeamParam::PositionY => Some(line.position_y),
            _ => None,
        },
        Beam::Look(_) => None,
    }
}

fn apply_animator_param(
    slot: &mut crate::animation::AnimatorSlot,
    param: AnimatorParam,
    value: f64,
    event: &ControlEvent,
) {
    match param {
        AnimatorParam::Waveform => {
            let index = (value as usize).min(WaveformKind::VARIANTS.len() - 1);
            slot.animator.waveform = WaveformKind::VARIANTS[index];
        }
        AnimatorParam::Speed => slot.animator.speed = value,
        AnimatorParam::Weight => slot.animator.weight = value,
        AnimatorParam::Smoothing => slot.animator.smoothing = value * 0.5,
        AnimatorParam::DutyCycle => slot.animator.duty_cycle = value,
        AnimatorParam::Pulse => {
            if event.is_press() {
                slot.animator.pulse = !slot.animator.pulse;
            }
        }
        AnimatorParam::Target => {
            // step 0 is "no target", the rest index the target list
            let index = value as usize;
            slot.target = if index == 0 {
                None
            } else {
                AnimationTarget::VARIANTS.get(index - 1).copied()
            };
        }
        AnimatorParam::ClockSource => {
            slot.animator.clock_source = match value as usize {
                0 => ClockSource::Master,
                index @ 1..=4 => ClockSource::Aux(index - 1),
                _ => ClockSource::FreeRun,
            };
        }
        AnimatorParam::ResetPhase => {
            if event.is_press() {
                slot.animator.reset_phase();
            }
        }
    }
}

fn read_animator_param(
    slot: &crate::animation::AnimatorSlot,
    param: AnimatorParam,
) -> Option<f64> {
    match param {
        AnimatorParam::Waveform => WaveformKind::VARIANTS
            .iter()
            .position(|kind| *kind == slot.animator.waveform)
            .map(|index| index as f64),
        AnimatorParam::Speed => Some(slot.animator.speed),
        AnimatorParam::Weight => Some(slot.animator.weight),
        AnimatorParam::Smoothing => Some(slot.animator.smoothing * 2.0),
        AnimatorParam::DutyCycle => Some(slot.animator.duty_cycle),
        AnimatorParam::Pulse => Some(if slot.animator.pulse { 1.0 } else { 0.0 }),
        AnimatorParam::Target => Some(match slot.target {
            None => 0.0,
            Some(target) => AnimationTarget::VARIANTS
                .iter()
                .position(|candidate| *candidate == target)
                .map(|index| (index + 1) as f64)
                .unwrap_or(0.0),
        }),
        AnimatorParam::ClockSource => Some(match slot.animator.clock_source {
            ClockSource::Master => 0.0,
            ClockSource::Aux(index) => (index % AUX_CLOCK_COUNT) as f64 + 1.0,
            ClockSource::FreeRun => 5.0,
        }),
        AnimatorParam::ResetPhase => None,
    }
}

// -------------------------------------------------------------------------------------------------
