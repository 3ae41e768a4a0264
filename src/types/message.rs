//! Message and header types.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{ChannelConfig, ChannelValue, Timestamp};
use crate::compression::Compression;

/// `htype` carried by main headers this crate emits and accepts.
pub const MAIN_HEADER_HTYPE: &str = "bsr_m-1.1";
/// `htype` carried by data headers.
pub const DATA_HEADER_HTYPE: &str = "bsr_d-1.1";

/// First frame of every message.
///
/// Built once per send and immutable afterwards. `hash` digests the data
/// header's exact wire bytes (post-compression), which lets a receiver
/// detect schema changes without decompressing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainHeader {
    pub htype: String,
    pub pulse_id: u64,
    pub global_timestamp: Timestamp,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Compression::is_none")]
    pub dh_compression: Compression,
}

impl MainHeader {
    pub fn new(
        pulse_id: u64,
        global_timestamp: Timestamp,
        hash: String,
        dh_compression: Compression,
    ) -> Self {
        Self {
            htype: MAIN_HEADER_HTYPE.to_string(),
            pulse_id,
            global_timestamp,
            hash,
            dh_compression,
        }
    }
}

/// Second frame: the ordered channel schema.
///
/// Stable for as long as the sender's channel set is unchanged; the frame
/// order of every following message is exactly `channels` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHeader {
    pub htype: String,
    pub channels: Vec<ChannelConfig>,
}

impl DataHeader {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self { htype: DATA_HEADER_HTYPE.to_string(), channels }
    }

    /// Expected multipart frame count for messages under this header:
    /// main header, data header, then a value/timestamp pair per channel.
    pub fn frame_count(&self) -> usize {
        2 + 2 * self.channels.len()
    }
}

/// One decoded pulse.
///
/// Headers are shared via `Arc`: consecutive messages with an unchanged
/// hash reference the same decoded [`DataHeader`] instance, so `Arc`
/// identity doubles as a cheap "did the schema change" signal.
#[derive(Debug, Clone)]
pub struct Message {
    pub main_header: Arc<MainHeader>,
    pub data_header: Arc<DataHeader>,
    /// Decoded values for the channels that fired this pulse (and passed the
    /// receiver-side channel filter).
    pub values: HashMap<String, ChannelValue>,
}

impl Message {
    /// Pulse counter from the main header.
    pub fn pulse_id(&self) -> u64 {
        self.main_header.pulse_id
    }

    /// Decoded value for a channel, if it fired this pulse.
    pub fn value(&self, channel: &str) -> Option<&ChannelValue> {
        self.values.get(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelType;

    #[test]
    fn main_header_wire_shape() {
        let h = MainHeader::new(
            42,
            Timestamp::new(100, 5).unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            Compression::None,
        );
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(json["htype"], "bsr_m-1.1");
        assert_eq!(json["pulse_id"], 42);
        assert_eq!(json["global_timestamp"]["sec"], 100);
        assert_eq!(json["global_timestamp"]["ns"], 5);
        // "none" compression is left off the wire
        assert!(json.get("dh_compression").is_none());

        let back: MainHeader = serde_json::from_value(json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn data_header_frame_count() {
        let dh = DataHeader::new(vec![
            ChannelConfig::scalar("a", ChannelType::Float64),
            ChannelConfig::scalar("b", ChannelType::Int32),
        ]);
        assert_eq!(dh.frame_count(), 6);
        assert_eq!(dh.htype, DATA_HEADER_HTYPE);
    }
}
