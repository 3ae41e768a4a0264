//! Send side: per-pulse channel multiplexing over a PUB or PUSH socket.
//!
//! A [`Sender`] owns a channel list where each entry pairs a
//! [`ChannelConfig`] with a [`ChannelSource`] that produces the channel's
//! value for a given pulse. Per pulse, channels fire according to their
//! cadence; a pulse on which no channel fires sends nothing at all.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::compression::Compression;
use crate::context::Context;
use crate::transport::{Address, SenderKind, SenderSocket, SocketOptions};
use crate::types::{ChannelConfig, DataHeader, MainHeader, Timestamp, Value};
use crate::wire::{encode_data_header, encode_main_header, encode_timestamp, encode_value};
use crate::{BsreadError, Result};

/// Produces a channel's sample for a pulse.
///
/// Implemented for free by any `FnMut(pulse) -> (Value, Timestamp)` closure.
pub trait ChannelSource: Send {
    fn sample(&mut self, pulse: u64) -> (Value, Timestamp);
}

impl<F> ChannelSource for F
where
    F: FnMut(u64) -> (Value, Timestamp) + Send,
{
    fn sample(&mut self, pulse: u64) -> (Value, Timestamp) {
        self(pulse)
    }
}

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub address: Address,
    pub kind: SenderKind,
    /// Per-socket option override; `None` uses the [`Context`] defaults.
    pub socket: Option<SocketOptions>,
    /// Compression applied to the data header frame.
    pub data_header_compression: Compression,
    /// When false, a socket send is bounded by `send_timeout` and the
    /// message is dropped on expiry (lossy, at-most-once).
    pub blocking_send: bool,
    pub send_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            address: Address::parse("tcp://*:9999"),
            kind: SenderKind::default(),
            socket: None,
            data_header_compression: Compression::None,
            blocking_send: true,
            send_timeout: Duration::from_millis(100),
        }
    }
}

struct Channel {
    config: ChannelConfig,
    source: Box<dyn ChannelSource>,
}

/// Pulse-synchronous message sender.
pub struct Sender {
    socket: SenderSocket,
    config: SenderConfig,
    channels: Vec<Channel>,
    data_header: Arc<DataHeader>,
    /// Wire bytes and hash of the current data header, cached until the
    /// channel set changes.
    header_wire: Vec<u8>,
    header_hash: String,
    pulse: u64,
}

impl Sender {
    /// Open the socket and start with an empty channel set.
    pub async fn connect(context: &Context, config: SenderConfig) -> Result<Self> {
        let options = context.socket_options(config.socket.as_ref());
        let socket =
            SenderSocket::open(context, config.kind, &config.address, &options).await?;
        info!(address = %config.address, kind = ?config.kind, "Sender connected");
        let mut sender = Self {
            socket,
            config,
            channels: Vec::new(),
            data_header: Arc::new(DataHeader::new(Vec::new())),
            header_wire: Vec::new(),
            header_hash: String::new(),
            pulse: 0,
        };
        sender.rebuild_header()?;
        Ok(sender)
    }

    /// Endpoint after bind resolution.
    pub fn endpoint(&self) -> &str {
        self.socket.endpoint()
    }

    /// The current channel schema.
    pub fn data_header(&self) -> &Arc<DataHeader> {
        &self.data_header
    }

    /// Add a channel. Regenerates and rehashes the data header.
    pub fn add_channel(
        &mut self,
        config: ChannelConfig,
        source: impl ChannelSource + 'static,
    ) -> Result<()> {
        if self.channels.iter().any(|c| c.config.name == config.name) {
            return Err(BsreadError::config(format!(
                "channel '{}' already registered",
                config.name
            )));
        }
        debug!(channel = %config.name, "Adding channel");
        self.channels.push(Channel { config, source: Box::new(source) });
        self.rebuild_header()
    }

    /// Remove a channel by name. Regenerates and rehashes the data header.
    pub fn remove_channel(&mut self, name: &str) -> Result<()> {
        let before = self.channels.len();
        self.channels.retain(|c| c.config.name != name);
        if self.channels.len() == before {
            return Err(BsreadError::ChannelNotFound { channel: name.to_string() });
        }
        debug!(channel = name, "Removed channel");
        self.rebuild_header()
    }

    /// Send the next pulse, stamping the global timestamp with wall time.
    ///
    /// Returns whether a message actually went out (`false` when no channel
    /// fired, which suppresses the whole message).
    pub async fn send(&mut self) -> Result<bool> {
        let pulse = self.pulse;
        self.pulse += 1;
        self.send_pulse(pulse, Timestamp::now()).await
    }

    /// Send one specific pulse with an explicit global timestamp.
    pub async fn send_pulse(&mut self, pulse: u64, global_timestamp: Timestamp) -> Result<bool> {
        if !self.channels.iter().any(|c| c.config.fires(pulse)) {
            return Ok(false);
        }

        let main = MainHeader::new(
            pulse,
            global_timestamp,
            self.header_hash.clone(),
            self.config.data_header_compression,
        );
        let mut frames = Vec::with_capacity(self.data_header.frame_count());
        frames.push(encode_main_header(&main)?);
        frames.push(self.header_wire.clone());

        for channel in &mut self.channels {
            if channel.config.fires(pulse) {
                let (value, timestamp) = channel.source.sample(pulse);
                frames.push(encode_value(&value, &channel.config)?);
                frames.push(encode_timestamp(timestamp, channel.config.encoding).to_vec());
            } else {
                // Placeholder pair keeps the frame count constant
                frames.push(Vec::new());
                frames.push(Vec::new());
            }
        }

        if self.config.blocking_send {
            self.socket.send(frames).await?;
        } else {
            match tokio::time::timeout(self.config.send_timeout, self.socket.send(frames)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(pulse, "Send timed out, message dropped");
                }
            }
        }
        Ok(true)
    }

    /// Close the socket.
    pub async fn close(self) {
        self.socket.close().await;
    }

    fn rebuild_header(&mut self) -> Result<()> {
        let header = DataHeader::new(self.channels.iter().map(|c| c.config.clone()).collect());
        let (wire, hash) = encode_data_header(&header, self.config.data_header_compression)?;
        debug!(hash = %hash, channels = header.channels.len(), "Data header regenerated");
        self.data_header = Arc::new(header);
        self.header_wire = wire;
        self.header_hash = hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;
    use crate::transport::{ReceiverKind, ReceiverSocket};
    use crate::types::ChannelType;
    use crate::wire::{Command, parse_data_header};

    fn counter_source(scale: f64) -> impl ChannelSource {
        move |pulse: u64| {
            (Value::Float64(pulse as f64 * scale), Timestamp::new(pulse, 0).unwrap())
        }
    }

    async fn sender_receiver_pair(config: SenderConfig) -> (Sender, ReceiverSocket, Context) {
        let ctx = Context::new();
        let sender = Sender::connect(&ctx, config).await.unwrap();
        let addr = Address::parse(sender.endpoint());
        let receiver =
            ReceiverSocket::open(&ctx, ReceiverKind::Pull, &addr, &SocketOptions::default())
                .await
                .unwrap();
        // Let the TCP handshake finish so the first send has a peer
        sleep(Duration::from_millis(300)).await;
        (sender, receiver, ctx)
    }

    fn push_config() -> SenderConfig {
        SenderConfig {
            address: Address::parse("tcp://*:0"),
            kind: SenderKind::Push,
            ..SenderConfig::default()
        }
    }

    #[tokio::test]
    async fn cadence_suppresses_whole_message() {
        let (mut sender, receiver, _ctx) = sender_receiver_pair(push_config()).await;
        sender
            .add_channel(
                ChannelConfig::scalar("a", ChannelType::Float64).with_cadence(10, 0),
                counter_source(1.0),
            )
            .unwrap();

        assert!(sender.send_pulse(0, Timestamp::new(0, 0).unwrap()).await.unwrap());
        for pulse in 1..10 {
            assert!(!sender.send_pulse(pulse, Timestamp::new(pulse, 0).unwrap()).await.unwrap());
        }
        assert!(sender.send_pulse(10, Timestamp::new(10, 0).unwrap()).await.unwrap());

        sender.close().await;
        receiver.close().await;
    }

    #[tokio::test]
    async fn idle_channels_send_placeholder_frames() {
        let (mut sender, mut receiver, _ctx) = sender_receiver_pair(push_config()).await;
        sender
            .add_channel(ChannelConfig::scalar("fast", ChannelType::Float64), counter_source(1.0))
            .unwrap();
        sender
            .add_channel(
                ChannelConfig::scalar("slow", ChannelType::Float64).with_cadence(2, 1),
                counter_source(2.0),
            )
            .unwrap();

        // Pulse 0: "fast" fires, "slow" does not
        assert!(sender.send_pulse(0, Timestamp::new(0, 0).unwrap()).await.unwrap());
        let frames = receiver.recv().await.unwrap();
        assert_eq!(frames.len(), 6);
        assert!(!frames[2].is_empty());
        assert!(frames[4].is_empty() && frames[5].is_empty());

        // Pulse 1: both fire
        assert!(sender.send_pulse(1, Timestamp::new(1, 0).unwrap()).await.unwrap());
        let frames = receiver.recv().await.unwrap();
        assert_eq!(frames.len(), 6);
        assert!(!frames[4].is_empty());

        sender.close().await;
        receiver.close().await;
    }

    #[tokio::test]
    async fn channel_set_changes_rehash_the_header() {
        let ctx = Context::new();
        let mut sender = Sender::connect(&ctx, push_config()).await.unwrap();

        let empty_hash = sender.header_hash.clone();
        sender
            .add_channel(ChannelConfig::scalar("a", ChannelType::Int32), |p: u64| {
                (Value::Int32(p as i32), Timestamp::new(p, 0).unwrap())
            })
            .unwrap();
        let one_hash = sender.header_hash.clone();
        assert_ne!(empty_hash, one_hash);
        assert_eq!(sender.data_header().channels.len(), 1);

        sender.remove_channel("a").unwrap();
        assert_eq!(sender.header_hash, empty_hash);

        assert!(matches!(
            sender.remove_channel("a"),
            Err(BsreadError::ChannelNotFound { .. })
        ));
        sender.close().await;
    }

    #[tokio::test]
    async fn duplicate_channel_name_is_rejected() {
        let ctx = Context::new();
        let mut sender = Sender::connect(&ctx, push_config()).await.unwrap();
        sender
            .add_channel(ChannelConfig::scalar("a", ChannelType::Float64), counter_source(1.0))
            .unwrap();
        let err = sender
            .add_channel(ChannelConfig::scalar("a", ChannelType::Float64), counter_source(1.0))
            .unwrap_err();
        assert!(matches!(err, BsreadError::Config { .. }));
        sender.close().await;
    }

    #[tokio::test]
    async fn wire_message_parses_back() {
        let (mut sender, mut receiver, _ctx) = sender_receiver_pair(SenderConfig {
            data_header_compression: Compression::Lz4,
            ..push_config()
        })
        .await;
        sender
            .add_channel(ChannelConfig::scalar("v", ChannelType::Float64), counter_source(0.5))
            .unwrap();

        sender.send_pulse(8, Timestamp::new(8, 125).unwrap()).await.unwrap();
        let frames = receiver.recv().await.unwrap();

        let Command::MainHeader(main) = Command::parse(&frames[0]) else {
            panic!("first frame is not a main header");
        };
        assert_eq!(main.pulse_id, 8);
        assert_eq!(main.dh_compression, Compression::Lz4);

        let header = parse_data_header(&frames[1], main.dh_compression).unwrap();
        assert_eq!(header.channels.len(), 1);
        assert_eq!(header.channels[0].name, "v");
        assert_eq!(main.hash, crate::wire::hash_bytes(&frames[1]));

        sender.close().await;
        receiver.close().await;
    }
}
