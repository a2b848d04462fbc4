// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compressed-block codec
//!
//! A 4160-byte block unit (eight 520-byte sectors) is stored as up to eight
//! run-length pairs. Each pair is 16 bytes on disk: a little-endian `u64`
//! repeat count followed by the 8-byte pattern that is repeated. Unused pairs
//! carry a count of zero.

use thiserror::Error;

/// Logical size of one compressed block unit.
pub const BLOCK_UNIT: usize = 4160;

/// Maximum number of run-length pairs per unit.
pub const MAX_PAIRS: usize = 8;

/// Encoded size of one pair (count + pattern).
pub const PAIR_SIZE: usize = 16;

/// Encoded size of one compressed unit.
pub const COMPRESSED_UNIT: usize = MAX_PAIRS * PAIR_SIZE;

/// Words (8-byte patterns) in one logical unit.
pub const UNIT_WORDS: u64 = (BLOCK_UNIT / 8) as u64;

/// Errors from decoding or verifying compressed units
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("compressed buffer length {actual} is not a multiple of {COMPRESSED_UNIT}")]
    Truncated { actual: usize },
    #[error("pattern counts reach {actual} words, unit holds {expected}")]
    WordOverflow { expected: u64, actual: u64 },
    #[error("pattern counts sum to {actual} words, unit holds {expected}")]
    WordUnderflow { expected: u64, actual: u64 },
}

/// One run of a repeated 8-byte pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternPair {
    pub count: u64,
    pub pattern: [u8; 8],
}

/// Whether blocks of this native size are stored compressed.
pub fn is_compressed_block_size(block_size: u32) -> bool {
    block_size != 0 && block_size as usize % BLOCK_UNIT == 0
}

/// Stored bytes per block for a given native block size.
pub fn stored_block_len(block_size: u32) -> usize {
    if is_compressed_block_size(block_size) {
        (block_size as usize / BLOCK_UNIT) * COMPRESSED_UNIT
    } else {
        block_size as usize
    }
}

/// Parse the pairs of one compressed unit.
pub fn pairs(unit: &[u8]) -> Result<[PatternPair; MAX_PAIRS], CodecError> {
    if unit.len() != COMPRESSED_UNIT {
        return Err(CodecError::Truncated { actual: unit.len() });
    }
    let mut out = [PatternPair {
        count: 0,
        pattern: [0; 8],
    }; MAX_PAIRS];
    for (pair, raw) in out.iter_mut().zip(unit.chunks_exact(PAIR_SIZE)) {
        let mut count = [0u8; 8];
        count.copy_from_slice(&raw[..8]);
        pair.count = u64::from_le_bytes(count);
        pair.pattern.copy_from_slice(&raw[8..]);
    }
    Ok(out)
}

/// Check that a unit's pattern counts cover exactly one block unit.
pub fn verify(unit: &[u8]) -> Result<(), CodecError> {
    let mut total: u64 = 0;
    for pair in pairs(unit)? {
        total = total.saturating_add(pair.count);
        if total > UNIT_WORDS {
            return Err(CodecError::WordOverflow {
                expected: UNIT_WORDS,
                actual: total,
            });
        }
    }
    if total != UNIT_WORDS {
        return Err(CodecError::WordUnderflow {
            expected: UNIT_WORDS,
            actual: total,
        });
    }
    Ok(())
}

/// Check every unit of a compressed buffer.
pub fn verify_buffer(buffer: &[u8]) -> Result<(), CodecError> {
    if buffer.len() % COMPRESSED_UNIT != 0 {
        return Err(CodecError::Truncated {
            actual: buffer.len(),
        });
    }
    buffer.chunks_exact(COMPRESSED_UNIT).try_for_each(verify)
}

/// Expand one compressed unit into `out` (exactly [`BLOCK_UNIT`] bytes).
///
/// Decoding stops at the first pair that would run past the unit; the words
/// written so far stay in `out` and the overflow is reported.
pub fn decode(unit: &[u8], out: &mut [u8]) -> Result<(), CodecError> {
    debug_assert_eq!(out.len(), BLOCK_UNIT);
    let mut words = out.chunks_exact_mut(8);
    let mut written: u64 = 0;

    for pair in pairs(unit)? {
        let reach = written.saturating_add(pair.count);
        if reach > UNIT_WORDS {
            for word in words.by_ref() {
                word.copy_from_slice(&pair.pattern);
            }
            return Err(CodecError::WordOverflow {
                expected: UNIT_WORDS,
                actual: reach,
            });
        }
        for word in words.by_ref().take(pair.count as usize) {
            word.copy_from_slice(&pair.pattern);
        }
        written += pair.count;
        if written == UNIT_WORDS {
            return Ok(());
        }
    }

    Err(CodecError::WordUnderflow {
        expected: UNIT_WORDS,
        actual: written,
    })
}

/// Expand a run of compressed units into a logical buffer.
///
/// Every unit is decoded even if an earlier one fails; the first error is
/// returned.
pub fn decode_buffer(buffer: &[u8], out: &mut [u8]) -> Result<(), CodecError> {
    let units = buffer.len() / COMPRESSED_UNIT;
    if buffer.len() % COMPRESSED_UNIT != 0 || out.len() != units * BLOCK_UNIT {
        return Err(CodecError::Truncated {
            actual: buffer.len(),
        });
    }
    let mut first_error = None;
    for (unit, block) in buffer
        .chunks_exact(COMPRESSED_UNIT)
        .zip(out.chunks_exact_mut(BLOCK_UNIT))
    {
        if let Err(e) = decode(unit, block) {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Encode one logical unit, if it fits in [`MAX_PAIRS`] runs.
pub fn encode(block: &[u8]) -> Option<[u8; COMPRESSED_UNIT]> {
    if block.len() != BLOCK_UNIT {
        return None;
    }
    let mut runs: Vec<PatternPair> = Vec::with_capacity(MAX_PAIRS);
    for word in block.chunks_exact(8) {
        match runs.last_mut() {
            Some(last) if last.pattern[..] == *word => last.count += 1,
            _ => {
                if runs.len() == MAX_PAIRS {
                    return None;
                }
                let mut pattern = [0u8; 8];
                pattern.copy_from_slice(word);
                runs.push(PatternPair { count: 1, pattern });
            }
        }
    }
    Some(encode_pairs(&runs))
}

/// Serialize pairs into a compressed unit; missing pairs are zero-count.
pub fn encode_pairs(runs: &[PatternPair]) -> [u8; COMPRESSED_UNIT] {
    let mut out = [0u8; COMPRESSED_UNIT];
    for (raw, pair) in out.chunks_exact_mut(PAIR_SIZE).zip(runs.iter().take(MAX_PAIRS)) {
        raw[..8].copy_from_slice(&pair.count.to_le_bytes());
        raw[8..].copy_from_slice(&pair.pattern);
    }
    out
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
