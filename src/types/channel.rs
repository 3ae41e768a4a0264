//! Channel configuration and wire data types.

use serde::{Deserialize, Serialize};

use crate::compression::Compression;

/// Supported wire data types for a channel.
///
/// Fixed-width scalar kinds plus the dynamic-width `String`. The wire names
/// are the lowercase forms carried in the data header (`"float64"`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
}

impl ChannelType {
    /// Size in bytes of one element, or `None` for the dynamic-width kind.
    pub const fn size(&self) -> Option<usize> {
        match self {
            ChannelType::Bool | ChannelType::Int8 | ChannelType::UInt8 => Some(1),
            ChannelType::Int16 | ChannelType::UInt16 => Some(2),
            ChannelType::Int32 | ChannelType::UInt32 | ChannelType::Float32 => Some(4),
            ChannelType::Int64 | ChannelType::UInt64 | ChannelType::Float64 => Some(8),
            ChannelType::String => None,
        }
    }
}

/// Byte order of a channel's value and timestamp frames.
///
/// Per channel, not per message: one message may mix encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    #[default]
    #[serde(rename = "little")]
    LittleEndian,
    #[serde(rename = "big")]
    BigEndian,
}

/// Configuration of one data channel inside a data header.
///
/// Immutable after construction; changing the channel set on a sender
/// regenerates the whole data header (and its hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name, unique within a data header.
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ChannelType,
    /// Array dimensions; empty or `[1]` means scalar.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,
    /// Send cadence divisor: the channel fires when
    /// `(pulse - offset) % modulo == 0`.
    #[serde(default = "default_modulo")]
    pub modulo: u64,
    /// Send cadence phase.
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub encoding: ByteOrder,
    #[serde(default, skip_serializing_if = "Compression::is_none")]
    pub compression: Compression,
}

fn default_modulo() -> u64 {
    1
}

impl ChannelConfig {
    /// Scalar channel with default cadence (every pulse), little endian,
    /// no compression.
    pub fn scalar(name: impl Into<String>, ty: ChannelType) -> Self {
        Self {
            name: name.into(),
            ty,
            shape: Vec::new(),
            modulo: 1,
            offset: 0,
            encoding: ByteOrder::default(),
            compression: Compression::None,
        }
    }

    /// Array channel with the given shape.
    pub fn array(name: impl Into<String>, ty: ChannelType, shape: Vec<usize>) -> Self {
        Self { shape, ..Self::scalar(name, ty) }
    }

    /// Set the send cadence.
    pub fn with_cadence(mut self, modulo: u64, offset: u64) -> Self {
        self.modulo = modulo.max(1);
        self.offset = offset;
        self
    }

    /// Set the wire byte order.
    pub fn with_encoding(mut self, encoding: ByteOrder) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the payload compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Number of elements described by the shape (1 for scalars).
    pub fn element_count(&self) -> usize {
        if self.shape.is_empty() { 1 } else { self.shape.iter().product() }
    }

    /// Whether the shape describes a scalar.
    pub fn is_scalar(&self) -> bool {
        self.element_count() == 1
    }

    /// Whether this channel emits data for the given pulse.
    pub fn fires(&self, pulse: u64) -> bool {
        cadence_fires(pulse, self.modulo, self.offset)
    }
}

/// The cadence predicate shared by sender multiplexing and receiver-side
/// channel filtering: fire when `(pulse - offset) % modulo == 0`.
///
/// Pulses before the offset phase never fire.
pub fn cadence_fires(pulse: u64, modulo: u64, offset: u64) -> bool {
    if pulse < offset {
        return false;
    }
    (pulse - offset) % modulo.max(1) == 0
}
