//! Pluggable compression for channel payloads and the data header.
//!
//! Three codecs are wired in:
//!
//! - **None**: passthrough.
//! - **Lz4**: `u32 BE uncompressed_len` followed by an LZ4 block stream.
//! - **BitshuffleLz4**: block-based, `u64 BE total_uncompressed_bytes`,
//!   `u32 BE block_size_bytes`, then per block a `u32 BE compressed_len`
//!   prefix and the LZ4-compressed bit-transposed block. Block boundaries
//!   come from [`bitshuffle::default_block_size`], a pure function of the
//!   element byte width.
//!
//! Codec contracts (all variants):
//! - the input slice is never modified;
//! - `compress` reserves `header_room` leading output bytes for a
//!   caller-written uncompressed prefix, so compressed payload can be
//!   spliced behind a fixed-size header without a copy;
//! - `decompress` skips `offset` input bytes before reading the stream;
//! - `decompressed_size` returns `None` when the format does not
//!   self-describe its size.

pub mod bitshuffle;

use serde::{Deserialize, Serialize};

use crate::{BsreadError, Result};

/// Compression applied to a channel's value frames or to the data header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Lz4,
    BitshuffleLz4,
}

impl Compression {
    /// `skip_serializing_if` helper: the wire omits `"none"`.
    pub fn is_none(&self) -> bool {
        matches!(self, Compression::None)
    }

    /// Compress `data`, reserving `header_room` zeroed leading bytes in the
    /// output for the caller's uncompressed prefix.
    ///
    /// `elem_size` is the element byte width of the payload; only the
    /// bitshuffle codec consumes it (strings and headers use 1).
    pub fn compress(&self, data: &[u8], header_room: usize, elem_size: usize) -> Vec<u8> {
        let mut out = vec![0u8; header_room];
        match self {
            Compression::None => out.extend_from_slice(data),
            Compression::Lz4 => {
                out.extend_from_slice(&(data.len() as u32).to_be_bytes());
                out.extend_from_slice(&lz4_flex::block::compress(data));
            }
            Compression::BitshuffleLz4 => {
                let elem_size = elem_size.max(1);
                let block_elems = bitshuffle::default_block_size(elem_size);
                let block_bytes = block_elems * elem_size;

                out.extend_from_slice(&(data.len() as u64).to_be_bytes());
                out.extend_from_slice(&(block_bytes as u32).to_be_bytes());
                for block in data.chunks(block_bytes) {
                    let shuffled = bitshuffle::shuffle(elem_size, block);
                    let compressed = lz4_flex::block::compress(&shuffled);
                    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
                    out.extend_from_slice(&compressed);
                }
            }
        }
        out
    }

    /// Decompress `data`, skipping `offset` leading input bytes.
    pub fn decompress(&self, data: &[u8], offset: usize, elem_size: usize) -> Result<Vec<u8>> {
        let data = data
            .get(offset..)
            .ok_or_else(|| BsreadError::compression("offset beyond input"))?;
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => {
                let size = read_u32(data, 0)? as usize;
                lz4_flex::block::decompress(&data[4..], size)
                    .map_err(|e| BsreadError::compression(e.to_string()))
            }
            Compression::BitshuffleLz4 => {
                let total = read_u64(data, 0)? as usize;
                let block_bytes = read_u32(data, 8)? as usize;
                if block_bytes == 0 {
                    return Err(BsreadError::compression("zero block size"));
                }

                let elem_size = elem_size.max(1);
                let mut out = Vec::with_capacity(total);
                let mut pos = 12;
                while out.len() < total {
                    let comp_len = read_u32(data, pos)? as usize;
                    pos += 4;
                    let block = data.get(pos..pos + comp_len).ok_or_else(|| {
                        BsreadError::compression("truncated bitshuffle block")
                    })?;
                    pos += comp_len;

                    let expect = block_bytes.min(total - out.len());
                    let shuffled = lz4_flex::block::decompress(block, expect)
                        .map_err(|e| BsreadError::compression(e.to_string()))?;
                    if shuffled.len() != expect {
                        return Err(BsreadError::compression(format!(
                            "block decompressed to {} bytes, expected {}",
                            shuffled.len(),
                            expect
                        )));
                    }
                    out.extend_from_slice(&bitshuffle::unshuffle(elem_size, &shuffled));
                }
                Ok(out)
            }
        }
    }

    /// Decompressed size declared by the stream, if the format carries one.
    ///
    /// The passthrough codec reports the remaining slice length; both LZ4
    /// formats carry an explicit size prefix. A format without one would
    /// return `None`.
    pub fn decompressed_size(&self, data: &[u8], offset: usize) -> Option<usize> {
        let data = data.get(offset..)?;
        match self {
            Compression::None => Some(data.len()),
            Compression::Lz4 => read_u32(data, 0).ok().map(|v| v as usize),
            Compression::BitshuffleLz4 => read_u64(data, 0).ok().map(|v| v as usize),
        }
    }

    /// Header-specific compression: the data header is a byte stream, so it
    /// always compresses with element width 1.
    pub fn compress_header(&self, data: &[u8]) -> Vec<u8> {
        self.compress(data, 0, 1)
    }

    /// Inverse of [`Compression::compress_header`].
    pub fn decompress_header(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decompress(data, 0, 1)
    }
}

fn read_u32(data: &[u8], pos: usize) -> Result<u32> {
    let bytes = data
        .get(pos..pos + 4)
        .ok_or_else(|| BsreadError::compression("truncated length prefix"))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(data: &[u8], pos: usize) -> Result<u64> {
    let bytes = data
        .get(pos..pos + 8)
        .ok_or_else(|| BsreadError::compression("truncated size prefix"))?;
    Ok(u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]))
}
