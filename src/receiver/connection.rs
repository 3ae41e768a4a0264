//! Receiver connection lifecycle.
//!
//! A [`Receiver`] moves `Stopped → Running → Stopped`; the edges are
//! compare-and-set so concurrent `connect`/`close` callers race safely and
//! cleanup runs at most once per connection lifetime. While running,
//! [`Receiver::receive`] drives a loop of timed socket receives: messages
//! are decoded and dispatched, timeouts feed the idle/inactive detector,
//! and misaligned multipart input is drained and retried without surfacing
//! an error.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::config::{InactiveBehavior, ReceiverConfig};
use super::handlers::Handlers;
use crate::context::Context;
use crate::transport::ReceiverSocket;
use crate::types::{ChannelValue, DataHeader, Message};
use crate::wire::{Command, decode_timestamp, decode_value, parse_data_header};
use crate::{BsreadError, Result};

struct SharedFlags {
    running: AtomicBool,
    stop_requested: AtomicBool,
}

/// Cross-task control handle for a [`Receiver`].
///
/// `close` only signals; the receive loop observes the flag within one
/// `receive_timeout` and cleans up on its own task.
#[derive(Clone)]
pub struct ReceiverHandle {
    shared: Arc<SharedFlags>,
}

impl ReceiverHandle {
    /// Request the receive loop to stop. Idempotent.
    pub fn close(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

/// Outcome of processing one multipart message.
enum Processed {
    Message(Message),
    /// Unusable input was drained; receive again.
    Drained,
    /// Connection-fatal condition; reconnect before receiving again.
    Reconnect,
}

/// Pulse-synchronous message receiver.
pub struct Receiver {
    context: Context,
    config: ReceiverConfig,
    handlers: Arc<Handlers>,
    shared: Arc<SharedFlags>,
    socket: Option<ReceiverSocket>,
    /// `(hash, parsed header)` of the last data header; the header is
    /// reparsed iff the incoming hash differs. Reset on every reconnect.
    cache: Option<(String, Arc<DataHeader>)>,
    idle: bool,
    inactive: bool,
    idle_deadline: Instant,
    inactive_deadline: Instant,
    connections: usize,
}

impl Receiver {
    /// Validate the configuration and create a stopped receiver.
    pub fn new(context: &Context, config: ReceiverConfig) -> Result<Self> {
        config.validate()?;
        let now = Instant::now();
        Ok(Self {
            context: context.clone(),
            idle_deadline: now + config.idle_timeout,
            inactive_deadline: now + config.inactive_timeout,
            config,
            handlers: Arc::new(Handlers::default()),
            shared: Arc::new(SharedFlags {
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
            }),
            socket: None,
            cache: None,
            idle: false,
            inactive: false,
            connections: 0,
        })
    }

    /// Callback registration surface.
    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.handlers
    }

    /// Control handle usable from other tasks.
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle { shared: Arc::clone(&self.shared) }
    }

    /// Configured receive timeout (drives the driver's shutdown deadline).
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Open the socket and enter `Running`.
    ///
    /// A no-op error when already running; callable again after a stop.
    pub async fn connect(&mut self) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BsreadError::config("receiver is already running"));
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        match self.open_socket().await {
            Ok(()) => {
                info!(address = %self.config.address, "Receiver connected");
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Receive the next decoded message.
    ///
    /// Blocks until a message arrives or the connection stops; `Ok(None)`
    /// is the normal answer for every expected termination path (explicit
    /// close, transport closure, the `Stop` inactivity behavior). Decode
    /// failures for a single message surface as `Err` and leave the
    /// connection running.
    pub async fn receive(&mut self) -> Result<Option<Message>> {
        loop {
            if self.shared.stop_requested.load(Ordering::SeqCst) {
                self.cleanup().await;
                return Ok(None);
            }
            let Some(socket) = self.socket.as_mut() else {
                return Ok(None);
            };

            let outcome = tokio::time::timeout(self.config.receive_timeout, socket.recv()).await;
            match outcome {
                Ok(Ok(frames)) => {
                    self.mark_activity();
                    match self.process(&frames)? {
                        Processed::Message(message) => return Ok(Some(message)),
                        Processed::Drained => continue,
                        Processed::Reconnect => self.reconnect().await?,
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Transport closed, stopping receiver");
                    self.cleanup().await;
                    return Ok(None);
                }
                Err(_) => {
                    if self.on_timeout().await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Stop and clean up. Idempotent; safe to call from the receiving task.
    pub async fn close(&mut self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.cleanup().await;
    }

    async fn open_socket(&mut self) -> Result<()> {
        let options = self.context.socket_options(self.config.socket.as_ref());
        let socket = ReceiverSocket::open(
            &self.context,
            self.config.kind,
            &self.config.address,
            &options,
        )
        .await?;
        self.socket = Some(socket);
        self.cache = None;
        self.reset_deadlines();
        self.connections += 1;
        self.handlers.fire_connection(self.connections);
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        info!(address = %self.config.address, "Reconnecting");
        if let Some(socket) = self.socket.take() {
            socket.close().await;
        }
        match self.open_socket().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.cleanup().await;
                Err(e)
            }
        }
    }

    /// Runs at most once per connection lifetime; the socket `Option` is
    /// the cleaned flag.
    async fn cleanup(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close().await;
            debug!("Receiver cleaned up");
        }
        self.cache = None;
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn reset_deadlines(&mut self) {
        let now = Instant::now();
        self.idle_deadline = now + self.config.idle_timeout;
        self.inactive_deadline = now + self.config.inactive_timeout;
    }

    /// Traffic arrived: clear the idle/inactive edges.
    fn mark_activity(&mut self) {
        if self.idle {
            self.idle = false;
            self.handlers.fire_idle(false);
        }
        if self.inactive {
            self.inactive = false;
            self.handlers.fire_inactive(false);
        }
        self.reset_deadlines();
    }

    /// Timeout path: idle/inactive detection and the inactivity policy.
    /// Returns true when the loop should stop.
    async fn on_timeout(&mut self) -> Result<bool> {
        let now = Instant::now();
        if now >= self.idle_deadline {
            if !self.idle {
                self.idle = true;
                debug!("Connection went idle");
                self.handlers.fire_idle(true);
            }
            self.idle_deadline = now + self.config.idle_timeout;
        }
        if now >= self.inactive_deadline {
            if !self.inactive {
                self.inactive = true;
                warn!("Connection went inactive");
                self.handlers.fire_inactive(true);
            }
            self.inactive_deadline = now + self.config.inactive_timeout;

            match self.config.inactive_behavior {
                InactiveBehavior::Reconnect => self.reconnect().await?,
                InactiveBehavior::Stop => {
                    info!("Inactive, stopping receiver");
                    self.cleanup().await;
                    return Ok(true);
                }
                InactiveBehavior::KeepRunning => {
                    debug!("Inactive, keeping the connection");
                }
            }
        }
        Ok(false)
    }

    fn process(&mut self, frames: &[Bytes]) -> Result<Processed> {
        let Some(first) = frames.first() else {
            return Ok(Processed::Drained);
        };
        let main = match Command::parse(first) {
            Command::MainHeader(main) => main,
            Command::Unrecognized => {
                // Misaligned multipart boundary: drain and retry silently
                debug!(discarded = frames.len().saturating_sub(1), "Drained unrecognized message");
                return Ok(Processed::Drained);
            }
        };
        if main.global_timestamp.validate().is_err() {
            warn!(pulse = main.pulse_id, "Malformed global timestamp, reconnecting");
            return Ok(Processed::Reconnect);
        }
        let Some(header_frame) = frames.get(1) else {
            debug!("Message without a data header frame, drained");
            return Ok(Processed::Drained);
        };

        let cached = self
            .cache
            .as_ref()
            .filter(|(hash, _)| *hash == main.hash)
            .map(|(_, header)| Arc::clone(header));
        let (data_header, header_changed) = match cached {
            Some(header) => (header, false),
            None => {
                let header = match parse_data_header(header_frame, main.dh_compression) {
                    Ok(header) => Arc::new(header),
                    Err(e) => {
                        debug!(error = %e, "Unparseable data header, drained");
                        return Ok(Processed::Drained);
                    }
                };
                self.cache = Some((main.hash.clone(), Arc::clone(&header)));
                (header, true)
            }
        };

        if frames.len() != data_header.frame_count() {
            debug!(
                expected = data_header.frame_count(),
                got = frames.len(),
                "Frame count mismatch, drained"
            );
            return Ok(Processed::Drained);
        }

        let pulse = main.pulse_id;
        let mut values = HashMap::new();
        for (i, channel) in data_header.channels.iter().enumerate() {
            let value_frame = &frames[2 + 2 * i];
            let time_frame = &frames[3 + 2 * i];
            if value_frame.is_empty() && time_frame.is_empty() {
                // Placeholder pair: the channel did not fire this pulse.
                // A fired channel always carries a 16-byte time frame, even
                // when its value frame is zero bytes (an empty string).
                continue;
            }
            if !self.config.wants(&channel.name, pulse) {
                continue;
            }
            let timestamp = match decode_timestamp(time_frame, channel.encoding) {
                Ok(ts) => ts,
                Err(e @ BsreadError::MalformedTimestamp { .. }) => {
                    warn!(channel = %channel.name, error = %e, "Reconnecting");
                    return Ok(Processed::Reconnect);
                }
                Err(e) => return Err(e),
            };
            let value = decode_value(value_frame, channel)?;
            values.insert(channel.name.clone(), ChannelValue { value, timestamp });
        }

        let message = Message {
            main_header: Arc::new(main),
            data_header,
            values,
        };

        // Fixed dispatch order per pulse
        self.handlers.fire_main_header(&message.main_header);
        if header_changed {
            self.handlers.fire_data_header(&message.data_header);
        }
        if self.config.parallel_handler_processing {
            let handlers = Arc::clone(&self.handlers);
            let snapshot = message.clone();
            tokio::spawn(async move {
                handlers.fire_values(&snapshot);
            });
        } else {
            self.handlers.fire_values(&message);
        }

        Ok(Processed::Message(message))
    }
}
