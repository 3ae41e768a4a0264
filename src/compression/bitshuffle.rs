//! Bit-transpose core for the bitshuffle+LZ4 codec.
//!
//! Bitshuffle rearranges a run of fixed-width elements so that bit `b` of
//! every element lands in one contiguous region. Telemetry values that vary
//! slowly agree in most high bits, so the transposed layout compresses far
//! better under LZ4.
//!
//! The transpose operates on whole groups of 8 elements; a trailing
//! sub-group remainder is copied through unchanged, which keeps the
//! transform a bijection for any input length.

/// Target block size in bytes shared by every bitshuffle code path.
const TARGET_BLOCK_BYTES: usize = 8192;

/// Elements per compression block for a given element byte width.
///
/// `8192 / elem_size`, rounded down to a multiple of 8, floor 8. This must
/// stay a pure function of the element width: the block boundaries are part
/// of the wire format, so any code path producing or consuming blocks has to
/// agree on them exactly.
pub fn default_block_size(elem_size: usize) -> usize {
    let bs = TARGET_BLOCK_BYTES / elem_size.max(1);
    (bs - bs % 8).max(8)
}

/// Bit-transpose `data` (a run of `elem_size`-byte elements).
///
/// `data.len()` must be a multiple of `elem_size`; the output has the same
/// length. The trailing `count % 8` elements are copied unshuffled.
pub fn shuffle(elem_size: usize, data: &[u8]) -> Vec<u8> {
    transpose(elem_size, data, Direction::Forward)
}

/// Inverse of [`shuffle`].
pub fn unshuffle(elem_size: usize, data: &[u8]) -> Vec<u8> {
    transpose(elem_size, data, Direction::Inverse)
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Inverse,
}

fn transpose(elem_size: usize, data: &[u8], dir: Direction) -> Vec<u8> {
    let elem_size = elem_size.max(1);
    debug_assert_eq!(data.len() % elem_size, 0);

    let count = data.len() / elem_size;
    let full = count - count % 8;
    let mut out = vec![0u8; data.len()];

    let bits = elem_size * 8;
    let rows = full / 8; // bytes per bit-plane
    for b in 0..bits {
        for i in 0..full {
            let (src_idx, src_bit, dst_idx, dst_bit) = match dir {
                // element-major -> bit-plane-major
                Direction::Forward => (i * elem_size + b / 8, b % 8, b * rows + i / 8, i % 8),
                // bit-plane-major -> element-major
                Direction::Inverse => (b * rows + i / 8, i % 8, i * elem_size + b / 8, b % 8),
            };
            let bit = (data[src_idx] >> src_bit) & 1;
            out[dst_idx] |= bit << dst_bit;
        }
    }

    // Sub-group remainder passes through untransposed
    out[full * elem_size..].copy_from_slice(&data[full * elem_size..]);
    out
}
