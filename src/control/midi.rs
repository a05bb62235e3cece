//! MIDI controller edge: decodes surface input into control events and writes echoes back.
//!
//! Decoding happens in the midir callback thread; events are pushed onto the bounded control
//! queue and never touch scene state here. Unknown or truncated messages are counted and
//! dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::control::{ControlEvent, ControlId, ControlUpdate};
use crate::error::Error;

// -------------------------------------------------------------------------------------------------

const CLIENT_NAME: &str = "arclight";

// -------------------------------------------------------------------------------------------------

/// Decode a raw MIDI message into a control id and a normalized value.
///
/// Note-on velocity and control change values map linearly onto `[0, 1]`; note-off (and the
/// running-status note-on with velocity zero) arrives as value 0.0.
fn decode(bytes: &[u8]) -> Option<(ControlId, f64)> {
    let (&status, data) = bytes.split_first()?;
    let channel = status & 0x0f;
    match status & 0xf0 {
        0x90 => {
            let note = *data.first()?;
            let velocity = *data.get(1)?;
            Some((
                ControlId::Note { channel, note },
                f64::from(velocity) / 127.0,
            ))
        }
        0x80 => {
            let note = *data.first()?;
            Some((ControlId::Note { channel, note }, 0.0))
        }
        0xb0 => {
            let control = *data.first()?;
            let value = *data.get(1)?;
            Some((
                ControlId::Control { channel, control },
                f64::from(value) / 127.0,
            ))
        }
        _ => None,
    }
}

// -------------------------------------------------------------------------------------------------

/// A connected MIDI input surface. Dropping the handle closes the connection.
pub struct MidiInputHandle {
    surface: String,
    port_name: String,
    malformed: Arc<AtomicU64>,
    _connection: MidiInputConnection<()>,
}

impl MidiInputHandle {
    /// Connect the first input port whose name contains `port_hint` and stream decoded events
    /// into the given queue.
    pub fn connect(
        surface: &str,
        port_hint: &str,
        events: Sender<ControlEvent>,
    ) -> Result<Self, Error> {
        let input =
            MidiInput::new(CLIENT_NAME).map_err(|err| Error::MidiInitError(err.to_string()))?;
        let ports = input.ports();
        let port = ports
            .iter()
            .find(|port| {
                input
                    .port_name(port)
                    .map(|name| name.contains(port_hint))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                Error::MidiConnectError(format!("no MIDI input port matching '{port_hint}'"))
            })?;
        let port_name = input.port_name(port).unwrap_or_else(|_| port_hint.to_string());

        let malformed = Arc::new(AtomicU64::new(0));
        let connection = {
            let surface = surface.to_string();
            let malformed = Arc::clone(&malformed);
            input
                .connect(
                    port,
                    CLIENT_NAME,
                    move |_timestamp, bytes, _| match decode(bytes) {
                        Some((control, value)) => {
                            let event = ControlEvent::new(surface.clone(), control, value);
                            if events.try_send(event).is_err() {
                                log::debug!("Control event queue full, dropping MIDI event");
                            }
                        }
                        None => {
                            malformed.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    (),
                )
                .map_err(|err| Error::MidiConnectError(err.to_string()))?
        };
        log::info!("Connected MIDI surface '{surface}' at '{port_name}'");

        Ok(Self {
            surface: surface.to_string(),
            port_name,
            malformed,
            _connection: connection,
        })
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Messages which could not be decoded so far.
    pub fn malformed_events(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

// -------------------------------------------------------------------------------------------------

/// A connected MIDI output for LED states and motor fader echoes.
pub struct MidiFeedback {
    surface: String,
    connection: MidiOutputConnection,
}

impl MidiFeedback {
    /// Connect the first output port whose name contains `port_hint`.
    pub fn connect(surface: &str, port_hint: &str) -> Result<Self, Error> {
        let output =
            MidiOutput::new(CLIENT_NAME).map_err(|err| Error::MidiInitError(err.to_string()))?;
        let ports = output.ports();
        let port = ports
            .iter()
            .find(|port| {
                output
                    .port_name(port)
                    .map(|name| name.contains(port_hint))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                Error::MidiConnectError(format!("no MIDI output port matching '{port_hint}'"))
            })?;
        let connection = output
            .connect(port, CLIENT_NAME)
            .map_err(|err| Error::MidiConnectError(err.to_string()))?;
        Ok(Self {
            surface: surface.to_string(),
            connection,
        })
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// Write one echo update to the device. OSC-addressed updates are not ours and are skipped.
    pub fn send(&mut self, update: &ControlUpdate) -> Result<(), Error> {
        let scaled = (update.value.clamp(0.0, 1.0) * 127.0).round() as u8;
        let bytes = match &update.control {
            ControlId::Note { channel, note } => {
                if scaled > 0 {
                    [0x90 | (channel & 0x0f), *note, scaled]
                } else {
                    [0x80 | (channel & 0x0f), *note, 0]
                }
            }
            ControlId::Control { channel, control } => {
                [0xb0 | (channel & 0x0f), *control, scaled]
            }
            ControlId::Address(_) => return Ok(()),
        };
        self.connection
            .send(&bytes)
            .map_err(|err| Error::MidiConnectError(err.to_string()))
    }
}

// -------------------------------------------------------------------------------------------------
