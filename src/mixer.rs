//! The mixer: an ordered, leveled stack of beam layers composed into per-channel frames.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::beam::{Beam, Look, LookLayer};
use crate::clock::MasterClock;
use crate::draw::DrawEntity;
use crate::error::Error;
use crate::utils::clamp_unit;

// -------------------------------------------------------------------------------------------------

/// Layers in a default mixer.
pub const DEFAULT_LAYER_COUNT: usize = 16;

/// Bump holds the layer at full level this long...
const BUMP_HOLD: Duration = Duration::from_millis(100);

/// ...then decays linearly to zero over this long.
const BUMP_DECAY: Duration = Duration::from_millis(300);

// -------------------------------------------------------------------------------------------------

/// Transient full-level override on a layer. Retriggerable; runs to zero on its own.
#[derive(Debug, Clone, Default)]
pub struct BumpEnvelope {
    elapsed: Duration,
    active: bool,
}

impl BumpEnvelope {
    /// Start (or restart) the envelope.
    pub fn trigger(&mut self) {
        self.elapsed = Duration::ZERO;
        self.active = true;
    }

    pub fn advance(&mut self, dt: Duration) {
        if self.active {
            self.elapsed += dt;
            if self.elapsed >= BUMP_HOLD + BUMP_DECAY {
                self.active = false;
            }
        }
    }

    /// Current override level in `[0, 1]`.
    pub fn value(&self) -> f64 {
        if !self.active {
            return 0.0;
        }
        if self.elapsed <= BUMP_HOLD {
            1.0
        } else {
            1.0 - (self.elapsed - BUMP_HOLD).as_secs_f64() / BUMP_DECAY.as_secs_f64()
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Set of video channels a layer renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMask(pub u32);

impl Default for ChannelMask {
    fn default() -> Self {
        Self::single(0)
    }
}

impl ChannelMask {
    pub fn single(channel: u8) -> Self {
        Self(1 << (channel % 32))
    }

    pub fn all() -> Self {
        Self(u32::MAX)
    }

    #[inline]
    pub fn contains(&self, channel: u8) -> bool {
        self.0 & (1 << (channel % 32)) != 0
    }

    pub fn insert(&mut self, channel: u8) {
        self.0 |= 1 << (channel % 32);
    }

    pub fn remove(&mut self, channel: u8) {
        self.0 &= !(1 << (channel % 32));
    }

    pub fn toggle(&mut self, channel: u8) {
        self.0 ^= 1 << (channel % 32);
    }
}

// -------------------------------------------------------------------------------------------------

/// One mixer slot. An empty slot holds no beam and contributes nothing.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    beam: Option<Beam>,
    /// Fader level in `[0, 1]`.
    pub level: f64,
    bump: BumpEnvelope,
    /// A masked layer is suppressed outright.
    pub mask: bool,
    pub channels: ChannelMask,
    pub name: String,
}

impl Layer {
    pub fn beam(&self) -> Option<&Beam> {
        self.beam.as_ref()
    }

    pub fn beam_mut(&mut self) -> Option<&mut Beam> {
        self.beam.as_mut()
    }

    pub fn set_beam(&mut self, beam: Beam) {
        self.beam = Some(beam);
    }

    /// Clear the slot back to empty, keeping level, mask and channel routing.
    pub fn clear(&mut self) {
        self.beam = None;
    }

    pub fn bump(&mut self) {
        self.bump.trigger();
    }

    /// Fader level with the bump override applied.
    pub fn effective_level(&self) -> f64 {
        clamp_unit(self.level).max(self.bump.value())
    }

    fn update(&mut self, dt: Duration, dt_beats: f64, clocks: &MasterClock) {
        self.bump.advance(dt);
        if let Some(beam) = &mut self.beam {
            beam.update(dt_beats, clocks);
        }
    }

    fn render(&self, channel: u8, clocks: &MasterClock) -> Option<DrawEntity> {
        if self.mask || !self.channels.contains(channel) {
            return None;
        }
        // a faded-out layer still draws, with level 0 attached to each command
        let beam = self.beam.as_ref()?;
        Some(beam.render(self.effective_level(), clocks))
    }
}

// -------------------------------------------------------------------------------------------------

/// Ordered stack of layers; lower indices draw first, the client composites "over" in that order.
#[derive(Debug, Clone)]
pub struct Mixer {
    layers: Vec<Layer>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(DEFAULT_LAYER_COUNT)
    }
}

impl Mixer {
    /// Create a mixer with a fixed number of empty layers.
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: (0..layer_count.max(1)).map(|_| Layer::default()).collect(),
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Put a beam into a slot.
    pub fn set_beam(&mut self, index: usize, beam: Beam) -> Result<(), Error> {
        self.layers
            .get_mut(index)
            .ok_or(Error::LayerNotFound(index))?
            .set_beam(beam);
        Ok(())
    }

    /// Clear a slot back to empty.
    pub fn clear(&mut self, index: usize) -> Result<(), Error> {
        self.layers
            .get_mut(index)
            .ok_or(Error::LayerNotFound(index))?
            .clear();
        Ok(())
    }

    /// Advance bump envelopes and all beams by one tick.
    pub fn update(&mut self, dt: Duration, clocks: &MasterClock) {
        let dt_beats = clocks.master().beats_for(dt);
        for layer in &mut self.layers {
            layer.update(dt, dt_beats, clocks);
        }
    }

    /// Compose one channel's frame: the concatenation of layer outputs in index order.
    pub fn render(&self, channel: u8, clocks: &MasterClock) -> DrawEntity {
        DrawEntity::Group(
            self.layers
                .iter()
                .filter_map(|layer| layer.render(channel, clocks))
                .collect(),
        )
    }

    /// Freeze the currently visible layers of a channel into a [`Look`].
    pub fn capture_look(&self, channel: u8) -> Look {
        Look::new(
            self.layers
                .iter()
                .filter_map(|layer| {
                    let beam = layer.beam.as_ref()?;
                    if layer.mask || !layer.channels.contains(channel) {
                        return None;
                    }
                    let level = layer.effective_level();
                    if level <= 0.0 {
                        return None;
                    }
                    Some(LookLayer {
                        beam: beam.clone(),
                        level,
                    })
                })
                .collect(),
        )
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::Tunnel;
    use crate::draw::DrawEntity;

    fn tunnel_with_hue(hue: f64, segments: u32) -> Beam {
        Tunnel {
            col_center: hue,
            segments,
            ..Tunnel::default()
        }
        .into()
    }

    fn group_of(entity: DrawEntity) -> Vec<DrawEntity> {
        match entity {
            DrawEntity::Group(entities) => entities,
            other => panic!("expected a collection, got {other:?}"),
        }
    }

    #[test]
    fn empty_mixer_renders_empty_collection() {
        let mixer = Mixer::default();
        let entity = mixer.render(0, &MasterClock::default());
        assert_eq!(entity, DrawEntity::empty());
    }

    #[test]
    fn layer_order_is_preserved() {
        let mut mixer = Mixer::new(4);
        mixer.set_beam(0, tunnel_with_hue(0.1, 2)).unwrap();
        mixer.set_beam(1, tunnel_with_hue(0.7, 3)).unwrap();
        mixer.layer_mut(0).unwrap().level = 1.0;
        mixer.layer_mut(1).unwrap().level = 1.0;

        let entities = group_of(mixer.render(0, &MasterClock::default()));
        assert_eq!(entities.len(), 2);
        let DrawEntity::Arcs(first) = &entities[0] else {
            panic!("expected arcs");
        };
        let DrawEntity::Arcs(second) = &entities[1] else {
            panic!("expected arcs");
        };
        assert!((first[0].hue - 0.1).abs() < 1e-6);
        assert!((second[0].hue - 0.7).abs() < 1e-6);
    }

    #[test]
    fn masked_layers_are_suppressed_but_zero_level_layers_emit() {
        let mut mixer = Mixer::new(4);
        mixer.set_beam(0, tunnel_with_hue(0.1, 2)).unwrap();
        mixer.set_beam(1, tunnel_with_hue(0.2, 2)).unwrap();
        mixer.set_beam(2, tunnel_with_hue(0.3, 2)).unwrap();
        mixer.layer_mut(0).unwrap().level = 1.0;
        mixer.layer_mut(0).unwrap().mask = true;
        mixer.layer_mut(1).unwrap().level = 0.0;
        mixer.layer_mut(2).unwrap().level = 0.5;

        // the masked layer contributes nothing; the faded-out layer still draws at level 0
        let entities = group_of(mixer.render(0, &MasterClock::default()));
        assert_eq!(entities.len(), 2);
        let DrawEntity::Arcs(faded) = &entities[0] else {
            panic!("expected arcs");
        };
        assert_eq!(faded[0].level, 0);
        let DrawEntity::Arcs(visible) = &entities[1] else {
            panic!("expected arcs");
        };
        assert_eq!(visible[0].level, 128);
    }

    #[test]
    fn channel_routing_filters_layers() {
        let mut mixer = Mixer::new(2);
        mixer.set_beam(0, tunnel_with_hue(0.1, 2)).unwrap();
        mixer.set_beam(1, tunnel_with_hue(0.2, 2)).unwrap();
        mixer.layer_mut(0).unwrap().level = 1.0;
        mixer.layer_mut(1).unwrap().level = 1.0;
        mixer.layer_mut(1).unwrap().channels = ChannelMask::single(1);

        let clocks = MasterClock::default();
        assert_eq!(group_of(mixer.render(0, &clocks)).len(), 1);
        assert_eq!(group_of(mixer.render(1, &clocks)).len(), 1);
        assert_eq!(group_of(mixer.render(2, &clocks)).len(), 0);
    }

    #[test]
    fn bump_decays_after_hold() {
        let mut mixer = Mixer::new(1);
        mixer.set_beam(0, tunnel_with_hue(0.0, 2)).unwrap();
        let layer = mixer.layer_mut(0).unwrap();
        layer.level = 0.0;
        layer.bump();

        let clocks = MasterClock::default();
        let step = Duration::from_millis(10);
        let mut last_level = u32::MAX;
        let mut elapsed = Duration::ZERO;
        while elapsed <= Duration::from_millis(450) {
            // the layer's arcs stay present throughout the decay, only their level drops
            let entities = group_of(mixer.render(0, &clocks));
            assert_eq!(entities.len(), 1);
            let DrawEntity::Arcs(arcs) = &entities[0] else {
                panic!("expected arcs at {elapsed:?}");
            };
            let level = arcs[0].level;
            if elapsed == Duration::ZERO {
                assert_eq!(level, 255);
            }
            if elapsed >= Duration::from_millis(400) {
                assert_eq!(level, 0);
            }
            assert!(level <= last_level, "bump level rose at {elapsed:?}");
            last_level = level;
            mixer.update(step, &clocks);
            elapsed += step;
        }
    }

    #[test]
    fn effective_level_is_max_of_fader_and_bump() {
        let mut layer = Layer {
            level: 0.6,
            ..Layer::default()
        };
        assert!((layer.effective_level() - 0.6).abs() < 1e-9);
        layer.bump();
        assert!((layer.effective_level() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn look_capture_freezes_visible_layers() {
        let mut mixer = Mixer::new(4);
        mixer.set_beam(0, tunnel_with_hue(0.1, 2)).unwrap();
        mixer.set_beam(1, tunnel_with_hue(0.2, 3)).unwrap();
        mixer.layer_mut(0).unwrap().level = 1.0;
        // layer 1 invisible: zero level
        let look = mixer.capture_look(0);
        assert_eq!(look.layers().len(), 1);
    }
}
