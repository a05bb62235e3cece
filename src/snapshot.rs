//! Explicit scene snapshot export and import.
//!
//! Snapshots are the only state that survives between invocations: mixer layers with their
//! beams, clock tempos and the beam store, written as JSON on operator request. Nothing here
//! runs on the tick path, and transient state (bump envelopes, accumulated angles, frame
//! numbers) is deliberately not captured.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::clock::{MasterClock, AUX_CLOCK_COUNT};
use crate::error::Error;
use crate::mixer::{ChannelMask, Mixer};
use crate::store::BeamStore;

// -------------------------------------------------------------------------------------------------

/// One captured mixer layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub beam: Option<Beam>,
    pub level: f64,
    pub mask: bool,
    pub channels: ChannelMask,
    pub name: String,
}

// -------------------------------------------------------------------------------------------------

/// A complete exportable scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub master_bpm: f64,
    pub aux_bpm: Vec<f64>,
    pub layers: Vec<LayerSnapshot>,
    pub store: BeamStore,
}

impl Snapshot {
    /// Capture the current scene.
    pub fn capture(mixer: &Mixer, clocks: &MasterClock, store: &BeamStore) -> Self {
        Self {
            master_bpm: clocks.master().bpm(),
            aux_bpm: (0..AUX_CLOCK_COUNT)
                .map(|index| clocks.aux(index).bpm())
                .collect(),
            layers: mixer
                .layers()
                .iter()
                .map(|layer| LayerSnapshot {
                    beam: layer.beam().cloned(),
                    level: layer.level,
                    mask: layer.mask,
                    channels: layer.channels,
                    name: layer.name.clone(),
                })
                .collect(),
            store: store.clone(),
        }
    }

    /// Restore a captured scene. Extra captured layers beyond the mixer's size are dropped;
    /// layers the capture misses keep their current state.
    pub fn apply(&self, mixer: &mut Mixer, clocks: &mut MasterClock, store: &mut BeamStore) {
        clocks.master_mut().set_bpm(self.master_bpm);
        for (index, bpm) in self.aux_bpm.iter().enumerate().take(AUX_CLOCK_COUNT) {
            clocks.aux_mut(index).set_bpm(*bpm);
        }
        for (index, captured) in self.layers.iter().enumerate() {
            let Some(layer) = mixer.layer_mut(index) else {
                log::warn!("Snapshot layer {index} does not fit the mixer, dropping it");
                continue;
            };
            match &captured.beam {
                Some(beam) => layer.set_beam(beam.clone()),
                None => layer.clear(),
            }
            layer.level = captured.level;
            layer.mask = captured.mask;
            layer.channels = captured.channels;
            layer.name = captured.name.clone();
        }
        *store = self.store.clone();
    }

    /// Write the snapshot as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|err| Error::SnapshotError(err.to_string()))
    }

    /// Read a snapshot back.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| Error::SnapshotError(err.to_string()))
    }
}

// -------------------------------------------------------------------------------------------------
