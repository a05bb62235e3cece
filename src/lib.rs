#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod animation;
mod beam;
mod clock;
mod control;
mod draw;
mod error;
mod mixer;
mod publisher;
mod show;
mod snapshot;
mod store;
mod utils;
mod waveform;

// public, flat re-exports
pub use error::Error;

pub use animation::{
    AnimationTarget, Animator, AnimatorBank, AnimatorSlot, ClockSource, MixMode, ModulationTable,
    ANIMATOR_COUNT,
};
pub use beam::{Beam, LineBeam, Look, LookLayer, Tunnel};
pub use clock::{Clock, MasterClock, TapState, TapTempo, AUX_CLOCK_COUNT, DEFAULT_BPM};
pub use control::{
    AnimatorParam, BeamParam, Binding, BindingTable, ClockId, ControlEvent, ControlId,
    ControlMapper, ControlTarget, ControlUpdate, MappingCurve, MidiFeedback, MidiInputHandle,
    OscFeedback, OscServer,
};
pub use draw::{ArcRecord, DrawEntity, Frame, LineRecord};
pub use mixer::{ChannelMask, Layer, Mixer, DEFAULT_LAYER_COUNT};
pub use publisher::{FramePublisher, FrameSubscriber};
pub use show::{Show, ShowHandle, ShowOptions, ShowState, DEFAULT_TICK_PERIOD};
pub use snapshot::{LayerSnapshot, Snapshot};
pub use store::BeamStore;
pub use waveform::WaveformKind;
