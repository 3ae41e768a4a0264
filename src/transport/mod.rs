//! Multipart transport: addresses, socket options, and ZeroMQ wrappers.

mod address;
mod socket;

pub use address::{Address, DEFAULT_PORT};
pub use socket::{ReceiverKind, ReceiverSocket, SenderKind, SenderSocket};

use serde::{Deserialize, Serialize};

/// Socket tuning options.
///
/// Carried per connection and defaulted from the [`crate::Context`]. The
/// pure-Rust backend applies a subset; options it cannot honor are logged
/// at socket-open time rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketOptions {
    /// Outstanding-message limit before the pattern's overflow behavior
    /// kicks in (drop for PUB, block for PUSH).
    pub high_water_mark: usize,
    /// How long close waits for queued messages, in milliseconds.
    pub linger_ms: u64,
    pub receive_buffer_size: Option<usize>,
    pub send_buffer_size: Option<usize>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            high_water_mark: 1000,
            linger_ms: 100,
            receive_buffer_size: None,
            send_buffer_size: None,
        }
    }
}
