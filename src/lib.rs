//! Pulse-synchronous data streaming (bsread) over a ZeroMQ-style
//! multipart transport.
//!
//! Many independent data channels, sampled at different sub-rates of a
//! common pulse counter, are multiplexed into one multipart message per
//! pulse and consumed by one or many receivers.
//!
//! # Features
//!
//! - **Wire codec**: JSON main/data headers with MD5 schema hashing,
//!   per-channel binary value and timestamp frames
//! - **Compression**: none, LZ4, and block-based bitshuffle+LZ4 per channel
//! - **Cadence multiplexing**: each channel fires on its own
//!   `(pulse - offset) % modulo == 0` sub-rate
//! - **Connection lifecycle**: idle/inactive detection, reconnect policies,
//!   drain-on-misalignment recovery
//! - **Windowed streams**: order-preserving past/current/future sections
//!   with bounded buffering and cooperative shutdown
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bsread::{Bsread, ChannelConfig, ChannelType, ReceiverConfig, Timestamp, Value};
//!
//! #[tokio::main]
//! async fn main() -> bsread::Result<()> {
//!     let bsread = Bsread::new();
//!
//!     let mut sender = bsread.sender(Default::default()).await?;
//!     sender.add_channel(
//!         ChannelConfig::scalar("beam_energy", ChannelType::Float64).with_cadence(10, 0),
//!         |pulse: u64| (Value::Float64(pulse as f64), Timestamp::now()),
//!     )?;
//!     sender.send().await?;
//!
//!     let mut receiver = bsread.receiver(ReceiverConfig::new("localhost:9999"))?;
//!     receiver.connect().await?;
//!     while let Some(message) = receiver.receive().await? {
//!         println!("pulse {}", message.pulse_id());
//!     }
//!     Ok(())
//! }
//! ```

mod context;
mod error;
pub mod types;

pub mod compression;
pub mod transport;
pub mod wire;

// Send / receive architecture
pub mod driver;
pub mod receiver;
pub mod sender;
pub mod stream;

// Core exports
pub use context::Context;
pub use error::{BsreadError, Result};
pub use types::*;

pub use compression::Compression;
pub use transport::{Address, ReceiverKind, SenderKind, SocketOptions};

// Main API exports
pub use driver::{Driver, DriverHandle, DriverOptions};
pub use receiver::{InactiveBehavior, Receiver, ReceiverConfig, RequestedChannel};
pub use sender::{ChannelSource, Sender, SenderConfig};
pub use stream::{StreamReader, StreamSection, WindowedStream};

/// Unified entry point tying senders and receivers to one shared
/// [`Context`].
///
/// Constructing senders and receivers through the same `Bsread` instance
/// makes them share socket defaults and the open-socket counter; the
/// context handle stays explicit instead of living in a hidden global.
///
/// # Example
///
/// ```rust,no_run
/// use bsread::{Bsread, ReceiverConfig};
///
/// #[tokio::main]
/// async fn main() -> bsread::Result<()> {
///     let bsread = Bsread::new();
///     let mut receiver = bsread.receiver(ReceiverConfig::new("tcp://source:9999"))?;
///     receiver.connect().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Bsread {
    context: Context,
}

impl Bsread {
    /// Create an entry point with a fresh context and default socket
    /// options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry point around an existing context.
    pub fn with_context(context: Context) -> Self {
        Self { context }
    }

    /// The shared transport context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Open a sender on this context.
    pub async fn sender(&self, config: SenderConfig) -> Result<Sender> {
        Sender::connect(&self.context, config).await
    }

    /// Create a stopped receiver on this context; call
    /// [`Receiver::connect`] to start it.
    pub fn receiver(&self, config: ReceiverConfig) -> Result<Receiver> {
        Receiver::new(&self.context, config)
    }
}
