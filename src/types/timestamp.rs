//! Timestamps on the bsread wire.

use serde::{Deserialize, Serialize};

use crate::{BsreadError, Result};

/// A `(seconds, nanoseconds)` pair.
///
/// Two timestamps travel with every message: the sender's
/// `global_timestamp` in the main header and a device-local timestamp per
/// channel value. The nanosecond part must stay below one second; anything
/// else is a malformed or adversarial frame and is treated as fatal for the
/// connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: u64,
    pub ns: u32,
}

impl Timestamp {
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Create a validated timestamp.
    pub fn new(sec: u64, ns: u32) -> Result<Self> {
        if ns >= Self::NANOS_PER_SEC {
            return Err(BsreadError::MalformedTimestamp { sec, ns: ns as u64 });
        }
        Ok(Self { sec, ns })
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self { sec: now.as_secs(), ns: now.subsec_nanos() }
    }

    /// Re-validate a timestamp decoded from the wire.
    ///
    /// Serde fills the fields without range checks, so every decode boundary
    /// calls this before the value escapes the wire layer.
    pub fn validate(&self) -> Result<()> {
        if self.ns >= Self::NANOS_PER_SEC {
            return Err(BsreadError::MalformedTimestamp { sec: self.sec, ns: self.ns as u64 });
        }
        Ok(())
    }

    /// Seconds as a fractional value, for display and ordering convenience.
    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.ns as f64 / Self::NANOS_PER_SEC as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overflowing_nanoseconds() {
        assert!(Timestamp::new(0, Timestamp::NANOS_PER_SEC).is_err());
        assert!(Timestamp::new(0, Timestamp::NANOS_PER_SEC - 1).is_ok());
    }

    #[test]
    fn validate_catches_wire_decoded_violations() {
        // Simulates serde filling fields without range checks
        let ts: Timestamp = serde_json::from_str(r#"{"sec":5,"ns":1000000001}"#).unwrap();
        assert!(matches!(ts.validate(), Err(BsreadError::MalformedTimestamp { .. })));
    }

    #[test]
    fn serde_wire_shape() {
        let ts = Timestamp::new(1700000000, 250_000_000).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, r#"{"sec":1700000000,"ns":250000000}"#);
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn now_is_valid() {
        assert!(Timestamp::now().validate().is_ok());
    }
}
