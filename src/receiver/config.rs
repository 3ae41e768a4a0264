//! Receiver configuration and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::{Address, ReceiverKind, SocketOptions};
use crate::types::cadence_fires;
use crate::{BsreadError, Result};

/// What to do when a connection goes inactive (no traffic past the
/// inactive timeout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InactiveBehavior {
    /// Close and reopen the socket at the same address, dropping the cached
    /// data header so the next message is treated as carrying a fresh one.
    #[default]
    Reconnect,
    /// Stop the receive loop; subsequent receives report no message.
    Stop,
    /// Log and keep waiting.
    KeepRunning,
}

/// Receive-side channel filter entry.
///
/// Only channels named here are decoded into the value map, and only on
/// pulses where the requested cadence fires. Frames of other channels are
/// still consumed off the wire, just not decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedChannel {
    pub name: String,
    pub modulo: u64,
    pub offset: u64,
}

impl RequestedChannel {
    /// Request every firing of a channel.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), modulo: 1, offset: 0 }
    }

    /// Restrict decoding to a sub-cadence of the channel's own cadence.
    pub fn with_cadence(mut self, modulo: u64, offset: u64) -> Self {
        self.modulo = modulo.max(1);
        self.offset = offset;
        self
    }

    pub fn matches(&self, name: &str, pulse: u64) -> bool {
        self.name == name && cadence_fires(pulse, self.modulo, self.offset)
    }
}

/// Receiver configuration.
///
/// The three timeouts are layered: `receive_timeout` bounds one socket
/// receive attempt, `idle_timeout` marks a short informational traffic gap,
/// `inactive_timeout` marks the longer actionable one. The ordering
/// `receive_timeout <= idle_timeout <= inactive_timeout` is required and
/// checked before any socket opens.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub address: Address,
    pub kind: ReceiverKind,
    /// Per-socket option override; `None` uses the [`crate::Context`]
    /// defaults.
    pub socket: Option<SocketOptions>,
    pub receive_timeout: Duration,
    pub idle_timeout: Duration,
    pub inactive_timeout: Duration,
    pub inactive_behavior: InactiveBehavior,
    /// When set, restricts which channels are decoded; `None` decodes all.
    pub requested_channels: Option<Vec<RequestedChannel>>,
    /// Dispatch value handlers on a spawned task instead of inline, so slow
    /// handlers do not stall the receive loop. Main/data header handlers
    /// stay inline to keep their per-pulse ordering.
    pub parallel_handler_processing: bool,
}

impl ReceiverConfig {
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            kind: ReceiverKind::default(),
            socket: None,
            receive_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(10),
            inactive_timeout: Duration::from_secs(30),
            inactive_behavior: InactiveBehavior::default(),
            requested_channels: None,
            parallel_handler_processing: false,
        }
    }

    /// Check the timeout ordering invariant.
    pub fn validate(&self) -> Result<()> {
        if self.receive_timeout.is_zero() {
            return Err(BsreadError::config("receive_timeout must be positive"));
        }
        if self.receive_timeout > self.idle_timeout {
            return Err(BsreadError::config(format!(
                "receive_timeout ({:?}) exceeds idle_timeout ({:?})",
                self.receive_timeout, self.idle_timeout
            )));
        }
        if self.idle_timeout > self.inactive_timeout {
            return Err(BsreadError::config(format!(
                "idle_timeout ({:?}) exceeds inactive_timeout ({:?})",
                self.idle_timeout, self.inactive_timeout
            )));
        }
        Ok(())
    }

    /// Whether a channel should be decoded on this pulse.
    pub(crate) fn wants(&self, name: &str, pulse: u64) -> bool {
        match &self.requested_channels {
            None => true,
            Some(requested) => requested.iter().any(|r| r.matches(name, pulse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_are_ordered() {
        assert!(ReceiverConfig::new("localhost").validate().is_ok());
    }

    #[test]
    fn timeout_ordering_is_enforced() {
        let mut config = ReceiverConfig::new("localhost");
        config.receive_timeout = Duration::from_secs(60);
        assert!(matches!(config.validate(), Err(BsreadError::Config { .. })));

        let mut config = ReceiverConfig::new("localhost");
        config.idle_timeout = config.inactive_timeout + Duration::from_secs(1);
        assert!(matches!(config.validate(), Err(BsreadError::Config { .. })));

        let mut config = ReceiverConfig::new("localhost");
        config.receive_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn channel_filter_reproduces_the_cadence_predicate() {
        let mut config = ReceiverConfig::new("localhost");
        assert!(config.wants("anything", 17));

        config.requested_channels =
            Some(vec![RequestedChannel::new("a").with_cadence(10, 0), RequestedChannel::new("b")]);
        assert!(config.wants("a", 0));
        assert!(!config.wants("a", 5));
        assert!(config.wants("a", 20));
        assert!(config.wants("b", 5));
        assert!(!config.wants("c", 0));
    }
}
