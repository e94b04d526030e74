//! Run-length encoding for a chunk's block array (C1 half of the codec;
//! the other half, the header and optional compression wrapper, lives in
//! `persistence`).
//!
//! The payload is a flat sequence of `(value, count)` byte pairs with
//! `count` capped at 255, so a run of 600 identical bytes encodes as
//! `(v,255)(v,255)(v,90)`. Decoding reconstructs the original linearization
//! verbatim; a length mismatch is rejected rather than silently truncated or
//! padded (§9 open-question decision).

use crate::error::{WorldError, WorldResult};

/// Encode `blocks` as a sequence of maximal `(value, count)` runs, each
/// capped at a count of 255.
#[must_use]
pub fn rle_encode(blocks: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(blocks.len() / 4 + 2);
    let mut iter = blocks.iter().copied();
    let Some(mut current) = iter.next() else {
        return out;
    };
    let mut count: u16 = 1;

    for b in iter {
        if b == current && count < 255 {
            count += 1;
        } else {
            out.push(current);
            out.push(count as u8);
            current = b;
            count = 1;
        }
    }
    out.push(current);
    out.push(count as u8);
    out
}

/// Decode an RLE payload, rejecting it if the reconstructed length does not
/// equal `expected_len`.
pub fn rle_decode(payload: &[u8], expected_len: usize) -> WorldResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pairs = payload.chunks_exact(2);
    for pair in &mut pairs {
        let value = pair[0];
        let count = pair[1];
        out.resize(out.len() + count as usize, value);
    }

    if out.len() != expected_len {
        return Err(WorldError::PayloadLengthMismatch {
            expected: expected_len,
            got: out.len(),
        });
    }

    Ok(out)
}
