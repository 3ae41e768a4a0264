//! Wire codec: multipart framing, headers, and per-channel frames.
//!
//! Frame layout per message (frame count is constant for a given data
//! header):
//!
//! ```text
//! [main header][data header][ch0 value][ch0 time] ... [chN value][chN time]
//! ```
//!
//! Channels not due on a pulse still occupy their two slots as empty
//! frames, which keeps multipart alignment recoverable after drops.

mod frames;
mod headers;

pub use frames::{decode_timestamp, decode_value, encode_timestamp, encode_value};
pub use headers::{Command, encode_data_header, encode_main_header, hash_bytes, parse_data_header};
