//! The show: one owned aggregate of scene state, plus the tick loop and threads driving it.
//!
//! Thread model: the tick thread owns all scene state (clocks, mixer, store, mapper) and the
//! publisher handle; controller edges decode on their own threads and enqueue events; a
//! feedback thread drains echo updates and may block on device writes. Nothing else ever
//! touches the scene, so there is no scene lock at all.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::clock::{MasterClock, DEFAULT_BPM};
use crate::control::{
    BindingTable, ControlEvent, ControlMapper, ControlUpdate, MidiFeedback, MidiInputHandle,
    OscFeedback, OscServer,
};
use crate::draw::Frame;
use crate::error::Error;
use crate::mixer::{Mixer, DEFAULT_LAYER_COUNT};
use crate::publisher::FramePublisher;
use crate::snapshot::Snapshot;
use crate::store::BeamStore;
use crate::utils::LogThrottle;

// -------------------------------------------------------------------------------------------------

/// Nominal tick period, roughly 60 frames per second.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(17);

const EVENT_QUEUE_SIZE: usize = 1024;
const FEEDBACK_QUEUE_SIZE: usize = 1024;

/// Upper bound on controller events drained per tick, so a flooding surface cannot stall the
/// frame clock; the queue carries the rest over into the next tick.
const MAX_EVENTS_PER_TICK: usize = 256;

// -------------------------------------------------------------------------------------------------

/// Startup configuration for a [`Show`].
#[derive(Debug, Clone)]
pub struct ShowOptions {
    pub tick_period: Duration,
    /// Frame stream listener address.
    pub bind_address: String,
    /// Number of independent video channel streams to emit.
    pub video_channels: u8,
    pub mixer_layers: usize,
    pub default_bpm: f64,
    /// MIDI input surfaces as `(surface id, port name hint)`.
    pub midi_inputs: Vec<(String, String)>,
    /// MIDI feedback outputs as `(surface id, port name hint)`.
    pub midi_outputs: Vec<(String, String)>,
    /// OSC receive socket as `(surface id, listen address)`.
    pub osc_listen: Option<(String, String)>,
    /// OSC feedback target as `(surface id, target address)`.
    pub osc_feedback: Option<(String, String)>,
    pub bindings: BindingTable,
}

impl Default for ShowOptions {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            bind_address: "0.0.0.0:6000".to_string(),
            video_channels: 1,
            mixer_layers: DEFAULT_LAYER_COUNT,
            default_bpm: DEFAULT_BPM,
            midi_inputs: Vec::new(),
            midi_outputs: Vec::new(),
            osc_listen: None,
            osc_feedback: None,
            bindings: BindingTable::performance_defaults("apc", "tablet"),
        }
    }
}

impl ShowOptions {
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    pub fn video_channels(mut self, channels: u8) -> Self {
        self.video_channels = channels.max(1);
        self
    }

    pub fn mixer_layers(mut self, layers: usize) -> Self {
        self.mixer_layers = layers.max(1);
        self
    }

    pub fn default_bpm(mut self, bpm: f64) -> Self {
        self.default_bpm = bpm;
        self
    }

    pub fn midi_input(mut self, surface: &str, port_hint: &str) -> Self {
        self.midi_inputs
            .push((surface.to_string(), port_hint.to_string()));
        self
    }

    pub fn midi_output(mut self, surface: &str, port_hint: &str) -> Self {
        self.midi_outputs
            .push((surface.to_string(), port_hint.to_string()));
        self
    }

    pub fn osc_listen(mut self, surface: &str, listen: &str) -> Self {
        self.osc_listen = Some((surface.to_string(), listen.to_string()));
        self
    }

    pub fn osc_feedback(mut self, surface: &str, target: &str) -> Self {
        self.osc_feedback = Some((surface.to_string(), target.to_string()));
        self
    }

    pub fn bindings(mut self, bindings: BindingTable) -> Self {
        self.bindings = bindings;
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// All scene state, owned by the tick thread while a show runs.
pub struct ShowState {
    clocks: MasterClock,
    mixer: Mixer,
    store: BeamStore,
    mapper: ControlMapper,
    video_channels: u8,
    frame_numbers: Vec<u32>,
    epoch: Instant,
}

impl ShowState {
    fn new(options: &ShowOptions, feedback: Sender<ControlUpdate>) -> Self {
        let video_channels = options.video_channels.max(1);
        Self {
            clocks: MasterClock::new(options.default_bpm),
            mixer: Mixer::new(options.mixer_layers),
            store: BeamStore::default(),
            mapper: ControlMapper::new(options.bindings.clone(), feedback),
            video_channels,
            frame_numbers: vec![0; usize::from(video_channels)],
            epoch: Instant::now(),
        }
    }

    pub fn clocks(&self) -> &MasterClock {
        &self.clocks
    }

    pub fn clocks_mut(&mut self) -> &mut MasterClock {
        &mut self.clocks
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn store(&self) -> &BeamStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BeamStore {
        &mut self.store
    }

    pub fn mapper(&self) -> &ControlMapper {
        &self.mapper
    }

    pub fn video_channels(&self) -> u8 {
        self.video_channels
    }

    /// Route one controller event into the scene.
    pub fn apply_event(&mut self, event: &ControlEvent) {
        self.mapper
            .apply(event, &mut self.mixer, &mut self.clocks, &mut self.store);
    }

    /// Advance the whole scene by one tick and produce each channel's frame.
    pub fn tick(&mut self, dt: Duration) -> Vec<(u8, Frame)> {
        self.clocks.advance(dt);
        self.mixer.update(dt, &self.clocks);
        let timestamp_ms = self.epoch.elapsed().as_millis() as i64;
        (0..self.video_channels)
            .map(|channel| {
                let entity = self.mixer.render(channel, &self.clocks);
                let slot = usize::from(channel);
                let frame_number = self.frame_numbers[slot];
                self.frame_numbers[slot] = frame_number.wrapping_add(1);
                (
                    channel,
                    Frame {
                        frame_number,
                        timestamp_ms,
                        entity,
                    },
                )
            })
            .collect()
    }

    /// Export the persistent scene state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.mixer, &self.clocks, &self.store)
    }

    /// Restore a previously exported scene.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        snapshot.apply(&mut self.mixer, &mut self.clocks, &mut self.store);
    }
}

// -------------------------------------------------------------------------------------------------

/// A configured show, ready to run its tick loop.
pub struct Show {
    options: ShowOptions,
    state: ShowState,
    publisher: FramePublisher,
    events: Receiver<ControlEvent>,
    events_send: Sender<ControlEvent>,
    feedback: Receiver<ControlUpdate>,
    midi_inputs: Vec<MidiInputHandle>,
    midi_outputs: Vec<MidiFeedback>,
    osc_server: Option<OscServer>,
    osc_feedback: Option<OscFeedback>,
}

impl Show {
    /// Bind sockets and connect controller surfaces.
    ///
    /// Socket binds are fatal (the operator misconfigured the rig); a missing controller device
    /// is logged and skipped, the show runs without it.
    pub fn new(options: ShowOptions) -> Result<Self, Error> {
        let publisher = FramePublisher::bind(options.bind_address.as_str())?;
        let (events_send, events) = bounded(EVENT_QUEUE_SIZE);
        let (feedback_send, feedback) = bounded(FEEDBACK_QUEUE_SIZE);

        let mut midi_inputs = Vec::new();
        for (surface, port_hint) in &options.midi_inputs {
            match MidiInputHandle::connect(surface, port_hint, events_send.clone()) {
                Ok(handle) => midi_inputs.push(handle),
                Err(err) => log::warn!("MIDI surface '{surface}' unavailable, skipping: {err}"),
            }
        }
        let mut midi_outputs = Vec::new();
        for (surface, port_hint) in &options.midi_outputs {
            match MidiFeedback::connect(surface, port_hint) {
                Ok(output) => midi_outputs.push(output),
                Err(err) => log::warn!("MIDI feedback '{surface}' unavailable, skipping: {err}"),
            }
        }
        let osc_server = match &options.osc_listen {
            Some((surface, listen)) => Some(OscServer::bind(surface, listen, events_send.clone())?),
            None => None,
        };
        let osc_feedback = match &options.osc_feedback {
            Some((surface, target)) => Some(OscFeedback::connect(surface, target)?),
            None => None,
        };

        let state = ShowState::new(&options, feedback_send);
        Ok(Self {
            options,
            state,
            publisher,
            events,
            events_send,
            feedback,
            midi_inputs,
            midi_outputs,
            osc_server,
            osc_feedback,
        })
    }

    pub fn options(&self) -> &ShowOptions {
        &self.options
    }

    pub fn state(&self) -> &ShowState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ShowState {
        &mut self.state
    }

    /// The bound frame stream address, useful when binding port 0.
    pub fn publisher_addr(&self) -> SocketAddr {
        self.publisher.local_addr()
    }

    /// A handle for injecting controller events besides the MIDI/OSC edges.
    pub fn events_sender(&self) -> Sender<ControlEvent> {
        self.events_send.clone()
    }

    /// Spawn the tick loop and the feedback thread; returns the handle that stops them.
    pub fn run(self) -> ShowHandle {
        let Self {
            options,
            mut state,
            mut publisher,
            events,
            events_send,
            feedback,
            midi_inputs,
            midi_outputs,
            osc_server,
            osc_feedback,
            ..
        } = self;
        drop(events_send);

        let stop = Arc::new(AtomicBool::new(false));

        let feedback_thread = std::thread::Builder::new()
            .name("surface-feedback".to_string())
            .spawn(move || feedback_loop(feedback, midi_outputs, osc_feedback))
            .ok();

        let tick_thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("show-tick".to_string())
                .spawn(move || {
                    let period = options.tick_period;
                    let mut publish_throttle = LogThrottle::once_per_minute();
                    let mut slip_throttle = LogThrottle::once_per_minute();
                    let mut last = Instant::now();
                    let mut deadline = last + period;

                    while !stop.load(Ordering::Relaxed) {
                        // drain controller input ahead of the frame
                        for _ in 0..MAX_EVENTS_PER_TICK {
                            match events.try_recv() {
                                Ok(event) => state.apply_event(&event),
                                Err(_) => break,
                            }
                        }

                        let now = Instant::now();
                        let dt = now.duration_since(last);
                        last = now;
                        for (channel, frame) in state.tick(dt) {
                            if let Err(err) = publisher.publish(channel, &frame) {
                                if publish_throttle.allow() {
                                    log::warn!("Dropping frame on channel {channel}: {err}");
                                }
                            }
                        }

                        deadline += period;
                        let now = Instant::now();
                        if now < deadline {
                            std::thread::sleep(deadline - now);
                        } else {
                            if slip_throttle.allow() {
                                log::warn!(
                                    "Tick loop slipped behind by {:?}",
                                    now.duration_since(deadline)
                                );
                            }
                            deadline = now;
                        }
                    }

                    // orderly shutdown: controller edges first, the publisher last; dropping
                    // the state disconnects the feedback queue and ends that thread too
                    drop(midi_inputs);
                    if let Some(server) = osc_server {
                        server.close();
                    }
                    publisher.close();
                })
                .ok()
        };

        ShowHandle {
            stop,
            tick_thread,
            feedback_thread,
        }
    }
}

// -------------------------------------------------------------------------------------------------

fn feedback_loop(
    feedback: Receiver<ControlUpdate>,
    mut midi_outputs: Vec<MidiFeedback>,
    osc_feedback: Option<OscFeedback>,
) {
    let mut write_throttle = LogThrottle::once_per_minute();
    // runs until every feedback sender is gone, i.e. the tick thread has exited
    while let Ok(update) = feedback.recv() {
        midi_outputs.retain_mut(|output| {
            let addressed = match &update.surface {
                Some(surface) => surface == output.surface(),
                None => true,
            };
            if !addressed {
                return true;
            }
            match output.send(&update) {
                Ok(()) => true,
                Err(err) => {
                    // device gone: drop it, the show keeps running
                    log::warn!("MIDI feedback to '{}' failed: {err}", output.surface());
                    false
                }
            }
        });
        if let Some(osc) = &osc_feedback {
            let addressed = match &update.surface {
                Some(surface) => surface == osc.surface(),
                None => true,
            };
            if addressed {
                if let Err(err) = osc.send(&update) {
                    if write_throttle.allow() {
                        log::warn!("OSC feedback to '{}' failed: {err}", osc.surface());
                    }
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Stops a running show. After [`stop`](Self::stop) returns, no further frames are published
/// and all engine threads have terminated.
pub struct ShowHandle {
    stop: Arc<AtomicBool>,
    tick_thread: Option<JoinHandle<()>>,
    feedback_thread: Option<JoinHandle<()>>,
}

impl ShowHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.tick_thread.take() {
            let _ = thread.join();
        }
        if let Some(thread) = self.feedback_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ShowHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::Tunnel;
    use crate::control::ControlId;
    use crate::draw::DrawEntity;
    use crate::publisher::FrameSubscriber;

    fn test_options() -> ShowOptions {
        ShowOptions::default().bind_address("127.0.0.1:0")
    }

    fn state_of(options: &ShowOptions) -> ShowState {
        let (feedback_send, _feedback_recv) = bounded(64);
        ShowState::new(options, feedback_send)
    }

    #[test]
    fn empty_scene_emits_empty_frames_on_all_channels() {
        let options = test_options().video_channels(2);
        let mut state = state_of(&options);

        let frames = state.tick(DEFAULT_TICK_PERIOD);
        assert_eq!(frames.len(), 2);
        for (index, (channel, frame)) in frames.iter().enumerate() {
            assert_eq!(usize::from(*channel), index);
            assert_eq!(frame.frame_number, 0);
            assert_eq!(frame.entity, DrawEntity::empty());
        }

        // frame numbers are monotonic per channel
        let frames = state.tick(DEFAULT_TICK_PERIOD);
        assert!(frames.iter().all(|(_, frame)| frame.frame_number == 1));
    }

    #[test]
    fn events_mutate_the_scene_between_ticks() {
        let options = test_options();
        let mut state = state_of(&options);
        state
            .mixer_mut()
            .set_beam(0, Tunnel::default().into())
            .unwrap();

        // fader up on layer 0 via the stock apc binding
        let event = ControlEvent::new(
            "apc",
            ControlId::Control {
                channel: 0,
                control: 7,
            },
            1.0,
        );
        state.apply_event(&event);
        let frames = state.tick(DEFAULT_TICK_PERIOD);
        assert!(frames[0].1.entity.command_count() > 0);
    }

    #[test]
    fn snapshot_round_trip_through_state() {
        let options = test_options();
        let mut state = state_of(&options);
        state
            .mixer_mut()
            .set_beam(2, Tunnel::default().into())
            .unwrap();
        let snapshot = state.snapshot();

        let mut restored = state_of(&options);
        restored.apply_snapshot(&snapshot);
        assert!(restored.mixer().layer(2).unwrap().beam().is_some());
    }

    #[test]
    fn run_publishes_and_stop_silences() {
        let mut show = Show::new(test_options().tick_period(Duration::from_millis(5))).unwrap();
        show.state_mut()
            .mixer_mut()
            .set_beam(0, Tunnel::default().into())
            .unwrap();
        show.state_mut().mixer_mut().layer_mut(0).unwrap().level = 1.0;
        let address = show.publisher_addr();

        let handle = show.run();
        let mut subscriber = FrameSubscriber::connect(address).unwrap();
        subscriber.set_timeout(Some(Duration::from_secs(5))).unwrap();
        let (channel, frame) = subscriber.recv().unwrap();
        assert_eq!(channel, 0);
        assert!(frame.entity.command_count() > 0);

        handle.stop();
        // after stop, the stream drains to EOF; no new frames are produced
        while subscriber.recv().is_ok() {}
    }

    #[test]
    fn injected_events_reach_a_running_show() {
        let show = Show::new(test_options().tick_period(Duration::from_millis(5))).unwrap();
        let events = show.events_sender();
        let address = show.publisher_addr();
        let handle = show.run();

        let mut subscriber = FrameSubscriber::connect(address).unwrap();
        subscriber.set_timeout(Some(Duration::from_secs(5))).unwrap();
        // the scene is empty until the tap-tempo button arrives; taps do not add beams, so
        // frames stay empty, but the event must not be rejected
        events
            .send(ControlEvent::new(
                "apc",
                ControlId::Note {
                    channel: 0,
                    note: 99,
                },
                1.0,
            ))
            .unwrap();
        let (_, frame) = subscriber.recv().unwrap();
        assert_eq!(frame.entity, DrawEntity::empty());
        handle.stop();
    }
}
