//! Looks: a whole layer stack frozen into a single recallable beam.

use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::clock::MasterClock;
use crate::draw::DrawEntity;

// -------------------------------------------------------------------------------------------------

/// One captured layer inside a [`Look`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookLayer {
    pub beam: Beam,
    /// The layer level at capture time; scaled by the look's own effective level when drawn.
    pub level: f64,
}

// -------------------------------------------------------------------------------------------------

/// A saved copy of the mixer's visible layers, drawable from a single mixer slot.
///
/// Looks keep animating: each captured beam still carries its animator bank and renders live.
/// On the wire a look is a nested collection entity, which is why the draw entity envelope is
/// recursive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Look {
    layers: Vec<LookLayer>,
}

impl Look {
    pub fn new(layers: Vec<LookLayer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[LookLayer] {
        &self.layers
    }

    pub fn update(&mut self, dt_beats: f64, clocks: &MasterClock) {
        for layer in &mut self.layers {
            layer.beam.update(dt_beats, clocks);
        }
    }

    pub fn render(&self, level: f64, clocks: &MasterClock) -> DrawEntity {
        DrawEntity::Group(
            self.layers
                .iter()
                .map(|layer| layer.beam.render(layer.level * level, clocks))
                .collect(),
        )
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::Tunnel;

    #[test]
    fn renders_nested_collection_scaled_by_level() {
        let look = Look::new(vec![
            LookLayer {
                beam: Tunnel {
                    segments: 2,
                    ..Tunnel::default()
                }
                .into(),
                level: 1.0,
            },
            LookLayer {
                beam: Tunnel {
                    segments: 3,
                    ..Tunnel::default()
                }
                .into(),
                level: 0.5,
            },
        ]);
        let clocks = MasterClock::default();
        let DrawEntity::Group(entities) = look.render(0.5, &clocks) else {
            panic!("expected a collection");
        };
        assert_eq!(entities.len(), 2);
        let DrawEntity::Arcs(first) = &entities[0] else {
            panic!("expected arcs");
        };
        let DrawEntity::Arcs(second) = &entities[1] else {
            panic!("expected arcs");
        };
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].level, 128);
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].level, 64);
    }
}
