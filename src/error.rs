//! Error types for bsread streaming.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context. The taxonomy follows the recovery rules of the receive loop:
//!
//! - **Framing**: a multipart message did not start with a recognizable
//!   header. Recovered locally by draining the message; never surfaced.
//! - **MalformedTimestamp**: an out-of-range `(sec, ns)` pair. Treated as
//!   connection-fatal and answered with a reconnect.
//! - **Transport**: socket-level failures. Closure stops the loop and turns
//!   subsequent `receive()` calls into `Ok(None)`.
//! - **Decode** / **Compression**: a single message could not be decoded;
//!   the loop keeps running.
//! - **Config**: rejected eagerly at construction, before any socket opens.
//!
//! Use [`BsreadError::is_recoverable`] to decide whether an operation is
//! worth retrying on the same connection.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for bsread operations.
pub type Result<T, E = BsreadError> = std::result::Result<T, E>;

/// Main error type for bsread operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BsreadError {
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Failed to connect to {address}: {reason}")]
    Connect {
        address: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Framing error in {context}: {details}")]
    Framing { context: String, details: String },

    #[error("Malformed timestamp: sec={sec}, ns={ns}")]
    MalformedTimestamp { sec: u64, ns: u64 },

    #[error("Decode error for channel '{channel}': {details}")]
    Decode { channel: String, details: String },

    #[error("Compression error: {details}")]
    Compression { details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Channel '{channel}' not found")]
    ChannelNotFound { channel: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("Stream is closed")]
    Closed,
}

impl BsreadError {
    /// Returns whether the operation is worth retrying on the same
    /// connection.
    pub fn is_recoverable(&self) -> bool {
        match self {
            BsreadError::Connect { .. } => true,
            BsreadError::Transport { .. } => true,
            BsreadError::Timeout { .. } => true,
            BsreadError::Framing { .. } => true,
            BsreadError::Decode { .. } => true,
            BsreadError::Compression { .. } => true,
            BsreadError::Config { .. } => false,
            BsreadError::MalformedTimestamp { .. } => false,
            BsreadError::ChannelNotFound { .. } => false,
            BsreadError::TypeConversion { .. } => false,
            BsreadError::Closed => false,
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        BsreadError::Config { reason: reason.into() }
    }

    /// Helper constructor for connection failures.
    pub fn connect_failed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        BsreadError::Connect { address: address.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with a source error.
    pub fn transport(
        context: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BsreadError::Transport { context: context.into(), source: Some(source) }
    }

    /// Helper constructor for framing errors.
    pub fn framing(context: impl Into<String>, details: impl Into<String>) -> Self {
        BsreadError::Framing { context: context.into(), details: details.into() }
    }

    /// Helper constructor for per-channel decode failures.
    pub fn decode(channel: impl Into<String>, details: impl Into<String>) -> Self {
        BsreadError::Decode { channel: channel.into(), details: details.into() }
    }

    /// Helper constructor for codec failures.
    pub fn compression(details: impl Into<String>) -> Self {
        BsreadError::Compression { details: details.into() }
    }
}

impl From<zeromq::ZmqError> for BsreadError {
    fn from(err: zeromq::ZmqError) -> Self {
        BsreadError::Transport { context: "zeromq".to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_json::Error> for BsreadError {
    fn from(err: serde_json::Error) -> Self {
        BsreadError::Framing { context: "json".to_string(), details: err.to_string() }
    }
}
