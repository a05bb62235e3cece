//! Drawable scene entities.
//!
//! The variant set is closed: the mixer, the control plane and the frame stream all work against
//! [`Beam`] as a tagged sum rather than trait objects, so beams can be cloned into the save grid
//! and serialized into snapshots without any dynamic machinery.

pub(crate) mod line;
pub(crate) mod look;
pub(crate) mod tunnel;

use serde::{Deserialize, Serialize};

pub use line::LineBeam;
pub use look::{Look, LookLayer};
pub use tunnel::Tunnel;

use crate::animation::AnimatorBank;
use crate::clock::MasterClock;
use crate::draw::DrawEntity;

// -------------------------------------------------------------------------------------------------

/// A drawable scene entity: an arc ring, a straight beam, or a saved layer stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Beam {
    Tunnel(Tunnel),
    Line(LineBeam),
    Look(Look),
}

impl Beam {
    /// Advance continuous state (animators, rotation and marquee accumulators) by a master-beat
    /// delta. Called once per tick before rendering.
    pub fn update(&mut self, dt_beats: f64, clocks: &MasterClock) {
        match self {
            Self::Tunnel(tunnel) => tunnel.update(dt_beats, clocks),
            Self::Line(_) => {}
            Self::Look(look) => look.update(dt_beats, clocks),
        }
    }

    /// Produce this beam's draw commands for the current tick at the given effective level.
    pub fn render(&self, level: f64, clocks: &MasterClock) -> DrawEntity {
        match self {
            Self::Tunnel(tunnel) => tunnel.render(level, clocks),
            Self::Line(line) => line.render(level),
            Self::Look(look) => look.render(level, clocks),
        }
    }

    /// The beam's animator bank, for beams that carry one.
    pub fn animators(&self) -> Option<&AnimatorBank> {
        match self {
            Self::Tunnel(tunnel) => Some(&tunnel.animators),
            Self::Line(_) | Self::Look(_) => None,
        }
    }

    pub fn animators_mut(&mut self) -> Option<&mut AnimatorBank> {
        match self {
            Self::Tunnel(tunnel) => Some(&mut tunnel.animators),
            Self::Line(_) | Self::Look(_) => None,
        }
    }
}

impl From<Tunnel> for Beam {
    fn from(tunnel: Tunnel) -> Self {
        Self::Tunnel(tunnel)
    }
}

impl From<LineBeam> for Beam {
    fn from(line: LineBeam) -> Self {
        Self::Line(line)
    }
}

impl From<Look> for Beam {
    fn from(look: Look) -> Self {
        Self::Look(look)
    }
}
