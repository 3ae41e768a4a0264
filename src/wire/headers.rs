//! Header serialization, hashing, and first-frame sniffing.

use md5::{Digest, Md5};

use crate::compression::Compression;
use crate::types::{DataHeader, MainHeader};
use crate::{BsreadError, Result};

/// Hex MD5 digest of a header's wire bytes.
///
/// Computed over the exact bytes placed on the wire (post-compression), so a
/// receiver can verify header identity without decompressing.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Serialize a main header to its wire frame (always uncompressed JSON).
pub fn encode_main_header(header: &MainHeader) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(header)?)
}

/// Serialize a data header and compress it for the wire.
///
/// Returns the wire bytes and their hash; the sender caches both until the
/// channel set changes.
pub fn encode_data_header(
    header: &DataHeader,
    compression: Compression,
) -> Result<(Vec<u8>, String)> {
    let json = serde_json::to_vec(header)?;
    let wire = compression.compress_header(&json);
    let hash = hash_bytes(&wire);
    Ok((wire, hash))
}

/// Parse a data header frame, undoing the compression declared in the main
/// header.
pub fn parse_data_header(bytes: &[u8], compression: Compression) -> Result<DataHeader> {
    let json = compression.decompress_header(bytes)?;
    let header: DataHeader = serde_json::from_slice(&json)?;
    if !header.htype.starts_with("bsr_d") {
        return Err(BsreadError::framing(
            "data header",
            format!("unexpected htype '{}'", header.htype),
        ));
    }
    Ok(header)
}

/// Decoded shape of a message's first frame.
///
/// The first frame is sniffed against the known message-start shapes by its
/// `htype` discriminator. Anything that fails to parse, or carries an
/// unknown discriminator, lands in `Unrecognized`, which drives the
/// receiver's drain-and-retry recovery instead of surfacing an error.
#[derive(Debug)]
pub enum Command {
    MainHeader(MainHeader),
    Unrecognized,
}

impl Command {
    /// Sniff a first frame. Never fails: malformed input is `Unrecognized`.
    pub fn parse(frame: &[u8]) -> Command {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(frame) else {
            return Command::Unrecognized;
        };
        let Some(htype) = value.get("htype").and_then(|h| h.as_str()) else {
            return Command::Unrecognized;
        };
        // Accept any minor revision of the main header shape
        if htype.starts_with("bsr_m-") {
            match serde_json::from_value::<MainHeader>(value) {
                Ok(header) => Command::MainHeader(header),
                Err(_) => Command::Unrecognized,
            }
        } else {
            Command::Unrecognized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelConfig, ChannelType, MAIN_HEADER_HTYPE, Timestamp};

    fn sample_main_header() -> MainHeader {
        MainHeader::new(
            7,
            Timestamp::new(100, 42).unwrap(),
            "aabb".to_string(),
            Compression::None,
        )
    }

    #[test]
    fn md5_matches_known_digest() {
        assert_eq!(hash_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn main_header_roundtrip() {
        let header = sample_main_header();
        let bytes = encode_main_header(&header).unwrap();
        match Command::parse(&bytes) {
            Command::MainHeader(parsed) => {
                assert_eq!(parsed, header);
                assert_eq!(parsed.htype, MAIN_HEADER_HTYPE);
            }
            Command::Unrecognized => panic!("main header not recognized"),
        }
    }

    #[test]
    fn data_header_hash_covers_wire_bytes() {
        let header = DataHeader::new(vec![ChannelConfig::scalar("a", ChannelType::Float64)]);

        let (plain, plain_hash) = encode_data_header(&header, Compression::None).unwrap();
        let (lz4, lz4_hash) = encode_data_header(&header, Compression::Lz4).unwrap();

        // Same schema, different wire bytes, therefore different hashes
        assert_ne!(plain, lz4);
        assert_ne!(plain_hash, lz4_hash);
        assert_eq!(plain_hash, hash_bytes(&plain));
        assert_eq!(lz4_hash, hash_bytes(&lz4));

        assert_eq!(parse_data_header(&plain, Compression::None).unwrap(), header);
        assert_eq!(parse_data_header(&lz4, Compression::Lz4).unwrap(), header);
    }

    #[test]
    fn sniffing_rejects_foreign_frames() {
        assert!(matches!(Command::parse(b"not json"), Command::Unrecognized));
        assert!(matches!(Command::parse(b"{}"), Command::Unrecognized));
        assert!(matches!(
            Command::parse(br#"{"htype":"bsr_d-1.1","channels":[]}"#),
            Command::Unrecognized
        ));
        // Right discriminator, wrong structure
        assert!(matches!(
            Command::parse(br#"{"htype":"bsr_m-1.1"}"#),
            Command::Unrecognized
        ));
    }

    #[test]
    fn sniffing_accepts_minor_revisions() {
        let mut header = sample_main_header();
        header.htype = "bsr_m-1.2".to_string();
        let bytes = encode_main_header(&header).unwrap();
        assert!(matches!(Command::parse(&bytes), Command::MainHeader(_)));
    }
}
