//! Core types for pulse-synchronous streaming.
//!
//! - [`ChannelConfig`] / [`ChannelType`] describe one channel of the data
//!   header: wire type, shape, send cadence, byte order, compression.
//! - [`Timestamp`] is the validated `(sec, ns)` pair used both globally and
//!   per channel value.
//! - [`Value`] is the closed set of tagged payload variants; [`FromValue`]
//!   gives typed extraction over it.
//! - [`MainHeader`] / [`DataHeader`] / [`Message`] model one decoded pulse.

mod channel;
mod message;
mod timestamp;
mod value;

pub use channel::{ByteOrder, ChannelConfig, ChannelType, cadence_fires};
pub use message::{DATA_HEADER_HTYPE, DataHeader, MAIN_HEADER_HTYPE, MainHeader, Message};
pub use timestamp::Timestamp;
pub use value::{ChannelValue, FromValue, Value};
