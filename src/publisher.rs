//! Frame publishing: TCP fan-out of encoded frames with latest-frame-wins delivery.
//!
//! The publisher binds one listener; clients connect and subscribe implicitly, there is no
//! handshake. Every subscriber gets a small drop-old queue and a writer thread: publishing from
//! the tick thread is a `force_push` which displaces the oldest queued message, so a slow
//! subscriber lags by losing frames, never by blocking the tick loop. A wire message is
//! `[u32 BE length][u8 channel][MessagePack frame]`; the channel byte is the topic, an empty
//! filter on the client side accepts all channels.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use crossbeam_queue::ArrayQueue;

use crate::draw::Frame;
use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// Frames a lagging subscriber may queue before losing the oldest.
const SUBSCRIBER_QUEUE_FRAMES: usize = 4;

/// Poll interval of the accept loop while waiting for connections or shutdown.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

// -------------------------------------------------------------------------------------------------

struct Subscriber {
    peer: String,
    queue: Arc<ArrayQueue<Arc<[u8]>>>,
    /// Wake signal for the writer thread; capacity 1, a lost wake is recovered by the timeout.
    wake: Sender<()>,
    alive: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

// -------------------------------------------------------------------------------------------------

/// Fans encoded frames out to all connected subscribers.
///
/// Owned by the tick thread; [`publish`](Self::publish) never blocks. The accept thread hands
/// new connections over through a channel, dead subscribers are pruned on the next publish.
pub struct FramePublisher {
    local_addr: SocketAddr,
    subscribers: Vec<Subscriber>,
    incoming: Receiver<Subscriber>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl FramePublisher {
    /// Bind the fan-out listener. A bind failure is fatal at startup.
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self, Error> {
        let listener = TcpListener::bind(address).map_err(Error::BindError)?;
        listener.set_nonblocking(true).map_err(Error::BindError)?;
        let local_addr = listener.local_addr().map_err(Error::BindError)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let (incoming_send, incoming) = bounded(64);
        let accept_thread = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("frame-accept".to_string())
                .spawn(move || accept_loop(listener, incoming_send, shutdown))?
        };
        log::info!("Publishing frames on {local_addr}");

        Ok(Self {
            local_addr,
            subscribers: Vec::new(),
            incoming,
            shutdown,
            accept_thread: Some(accept_thread),
        })
    }

    /// The bound address, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Currently connected subscribers (after pruning on the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Encode and enqueue one frame for all subscribers of a channel topic. Never blocks; a
    /// full subscriber queue drops its oldest message.
    pub fn publish(&mut self, channel: u8, frame: &Frame) -> Result<(), Error> {
        // adopt new connections and drop dead ones first
        while let Ok(subscriber) = self.incoming.try_recv() {
            self.subscribers.push(subscriber);
        }
        self.prune();
        if self.subscribers.is_empty() {
            return Ok(());
        }

        let payload = frame.encode()?;
        let mut message = Vec::with_capacity(payload.len() + 5);
        message
            .write_u32::<BigEndian>(payload.len() as u32 + 1)
            .and_then(|()| message.write_u8(channel))
            .map_err(Error::IoError)?;
        message.extend_from_slice(&payload);
        let message: Arc<[u8]> = message.into();

        for subscriber in &self.subscribers {
            subscriber.queue.force_push(Arc::clone(&message));
            match subscriber.wake.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    subscriber.alive.store(false, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn prune(&mut self) {
        let mut index = 0;
        while index < self.subscribers.len() {
            if self.subscribers[index].alive.load(Ordering::Relaxed) {
                index += 1;
            } else {
                let mut subscriber = self.subscribers.swap_remove(index);
                log::info!("Frame subscriber {} disconnected", subscriber.peer);
                if let Some(writer) = subscriber.writer.take() {
                    let _ = writer.join();
                }
            }
        }
    }

    /// Stop the accept loop, close all subscriber connections and wait for their threads.
    pub fn close(mut self) {
        self.shutdown_threads();
    }

    fn shutdown_threads(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
        }
        for mut subscriber in self.subscribers.drain(..) {
            subscriber.alive.store(false, Ordering::Relaxed);
            let _ = subscriber.wake.try_send(());
            if let Some(writer) = subscriber.writer.take() {
                let _ = writer.join();
            }
        }
    }
}

impl Drop for FramePublisher {
    fn drop(&mut self) {
        self.shutdown_threads();
    }
}

// -------------------------------------------------------------------------------------------------

fn accept_loop(listener: TcpListener, incoming: Sender<Subscriber>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                match spawn_writer(stream, peer) {
                    Ok(subscriber) => {
                        log::info!("Frame subscriber {peer} connected");
                        if incoming.send(subscriber).is_err() {
                            return;
                        }
                    }
                    Err(err) => log::warn!("Failed to set up subscriber {peer}: {err}"),
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                log::warn!("Frame listener accept error: {err}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn spawn_writer(mut stream: TcpStream, peer: SocketAddr) -> Result<Subscriber, Error> {
    let queue = Arc::new(ArrayQueue::<Arc<[u8]>>::new(SUBSCRIBER_QUEUE_FRAMES));
    let (wake, wake_recv) = bounded::<()>(1);
    let alive = Arc::new(AtomicBool::new(true));

    let writer = {
        let queue = Arc::clone(&queue);
        let alive = Arc::clone(&alive);
        std::thread::Builder::new()
            .name(format!("frame-writer-{peer}"))
            .spawn(move || {
                while alive.load(Ordering::Relaxed) {
                    // recover from lost wakes via the timeout
                    let _ = wake_recv.recv_timeout(ACCEPT_POLL);
                    while let Some(message) = queue.pop() {
                        if let Err(err) = stream.write_all(&message) {
                            log::debug!("Frame write to {peer} failed: {err}");
                            alive.store(false, Ordering::Relaxed);
                            break;
                        }
                    }
                }
            })?
    };

    Ok(Subscriber {
        peer: peer.to_string(),
        queue,
        wake,
        alive,
        writer: Some(writer),
    })
}

// -------------------------------------------------------------------------------------------------

/// Client-side counterpart: a blocking subscriber connection which reads framed messages.
///
/// Display clients typically drain everything available each render pass and draw only the
/// newest frame of their channel.
pub struct FrameSubscriber {
    stream: TcpStream,
}

impl FrameSubscriber {
    /// Connect to a publisher.
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, Error> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Limit how long [`recv`](Self::recv) blocks waiting for a message.
    pub fn set_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Block until the next `(channel, frame)` message arrives.
    pub fn recv(&mut self) -> Result<(u8, Frame), Error> {
        let length = self.stream.read_u32::<BigEndian>()? as usize;
        if length == 0 {
            return Err(Error::DecodeError("empty frame message".to_string()));
        }
        let channel = self.stream.read_u8()?;
        let mut payload = vec![0u8; length - 1];
        self.stream.read_exact(&mut payload)?;
        Ok((channel, Frame::decode(&payload)?))
    }
}

// -------------------------------------------------------------------------------------------------
