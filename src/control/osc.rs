//! OSC controller edge: a UDP receive thread decoding tablet traffic into control events.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};

use crate::control::{ControlEvent, ControlId, ControlUpdate};
use crate::error::Error;
use crate::utils::LogThrottle;

// -------------------------------------------------------------------------------------------------

const RECV_TIMEOUT: Duration = Duration::from_millis(250);
const RECV_BUFFER_SIZE: usize = 8 * 1024;

// -------------------------------------------------------------------------------------------------

/// The first usable argument of an OSC message as a normalized value. Argument-less messages
/// are bang-style button presses.
fn message_value(message: &OscMessage) -> f64 {
    for arg in &message.args {
        match arg {
            OscType::Float(value) => return f64::from(*value),
            OscType::Double(value) => return *value,
            OscType::Int(value) => return f64::from(*value),
            OscType::Long(value) => return *value as f64,
            OscType::Bool(value) => return if *value { 1.0 } else { 0.0 },
            _ => continue,
        }
    }
    1.0
}

/// Flatten a packet (bundles recurse) into control events.
fn dispatch(surface: &str, packet: OscPacket, events: &Sender<ControlEvent>) {
    match packet {
        OscPacket::Message(message) => {
            let value = message_value(&message);
            let event = ControlEvent::new(surface, ControlId::Address(message.addr), value);
            if events.try_send(event).is_err() {
                log::debug!("Control event queue full, dropping OSC event");
            }
        }
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                dispatch(surface, packet, events);
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A bound OSC receive socket with its decode thread.
pub struct OscServer {
    surface: String,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl OscServer {
    /// Bind `listen` (e.g. `0.0.0.0:9000`) and stream decoded events into the given queue.
    pub fn bind(surface: &str, listen: &str, events: Sender<ControlEvent>) -> Result<Self, Error> {
        let socket = UdpSocket::bind(listen).map_err(Error::OscSocketError)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let local_addr = socket.local_addr()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let malformed = Arc::new(AtomicU64::new(0));
        let thread = {
            let surface = surface.to_string();
            let shutdown = Arc::clone(&shutdown);
            let malformed = Arc::clone(&malformed);
            std::thread::Builder::new()
                .name(format!("osc-{surface}"))
                .spawn(move || {
                    let mut buffer = [0u8; RECV_BUFFER_SIZE];
                    let mut error_throttle = LogThrottle::once_per_minute();
                    while !shutdown.load(Ordering::Relaxed) {
                        match socket.recv(&mut buffer) {
                            Ok(received) => {
                                match rosc::decoder::decode_udp(&buffer[..received]) {
                                    Ok((_, packet)) => dispatch(&surface, packet, &events),
                                    Err(err) => {
                                        malformed.fetch_add(1, Ordering::Relaxed);
                                        log::debug!("Undecodable OSC packet: {err}");
                                    }
                                }
                            }
                            Err(err)
                                if matches!(
                                    err.kind(),
                                    std::io::ErrorKind::WouldBlock
                                        | std::io::ErrorKind::TimedOut
                                ) => {}
                            Err(err) => {
                                if error_throttle.allow() {
                                    log::warn!("OSC receive error on '{surface}': {err}");
                                }
                            }
                        }
                    }
                })?
        };
        log::info!("Listening for OSC surface '{surface}' on {local_addr}");

        Ok(Self {
            surface: surface.to_string(),
            local_addr,
            shutdown,
            malformed,
            thread: Some(thread),
        })
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// The bound receive address, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Packets which could not be decoded so far.
    pub fn malformed_packets(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Stop the receive thread and wait for it to exit.
    pub fn close(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.stop();
    }
}

// -------------------------------------------------------------------------------------------------

/// Sends echo updates to a tablet as OSC float messages.
pub struct OscFeedback {
    surface: String,
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscFeedback {
    /// Create a sender towards `target` (e.g. `192.168.1.20:9001`).
    pub fn connect(surface: &str, target: &str) -> Result<Self, Error> {
        let target = target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::IoError(std::io::Error::other("unresolvable OSC target")))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            surface: surface.to_string(),
            socket,
            target,
        })
    }

    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// Write one echo update. MIDI-addressed updates are not ours and are skipped.
    pub fn send(&self, update: &ControlUpdate) -> Result<(), Error> {
        let ControlId::Address(address) = &update.control else {
            return Ok(());
        };
        let packet = OscPacket::Message(OscMessage {
            addr: address.clone(),
            args: vec![OscType::Float(update.value as f32)],
        });
        let bytes =
            rosc::encoder::encode(&packet).map_err(|err| Error::EncodeError(err.to_string()))?;
        self.socket.send_to(&bytes, self.target)?;
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn receives_and_decodes_messages() {
        let (events_send, events_recv) = bounded(64);
        let server = OscServer::bind("tablet", "127.0.0.1:0", events_send).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let packet = OscPacket::Message(OscMessage {
            addr: "/layer/0/level".to_string(),
            args: vec![OscType::Float(0.75)],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        sender.send_to(&bytes, server.local_addr()).unwrap();

        let event = events_recv.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.surface, "tablet");
        assert_eq!(event.control, ControlId::Address("/layer/0/level".to_string()));
        assert!((event.value - 0.75).abs() < 1e-6);
        server.close();
    }

    #[test]
    fn undecodable_packets_are_counted() {
        let (events_send, events_recv) = bounded(64);
        let server = OscServer::bind("tablet", "127.0.0.1:0", events_send).unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"not osc", server.local_addr()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while server.malformed_packets() == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.malformed_packets(), 1);
        assert!(events_recv.is_empty());
        server.close();
    }

    #[test]
    fn message_values_normalize_across_types() {
        let message = |args: Vec<OscType>| OscMessage {
            addr: "/x".to_string(),
            args,
        };
        assert_eq!(message_value(&message(vec![OscType::Float(0.5)])), 0.5);
        assert_eq!(message_value(&message(vec![OscType::Int(1)])), 1.0);
        assert_eq!(message_value(&message(vec![OscType::Bool(false)])), 0.0);
        // bang-style: no arguments means a press
        assert_eq!(message_value(&message(vec![])), 1.0);
        // leading non-numeric arguments are skipped
        assert_eq!(
            message_value(&message(vec![
                OscType::String("page".to_string()),
                OscType::Float(0.25)
            ])),
            0.25
        );
    }
}
