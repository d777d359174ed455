#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Core types shared by every chainbrute backend.
//!
//! This crate provides:
//! - `CandidateGenerator`: maps an absolute 64-bit index to the fixed-width
//!   little-endian word block consumed by the device pipeline.
//! - `digests_match`: prefix comparison of a slot's combined output against
//!   the target digest.
//! - `TargetDigest`: the parsed target bytes and their textual forms.
//! - `reference`: host implementations of the digest chain, bit-exact with
//!   the device kernels.

pub mod reference;
mod target;

pub use target::{TargetDigest, TargetError, DEFAULT_TARGET};

/// Bytes per device word.
pub const WORD_SIZE: usize = 4;

/// Default number of words per candidate slot. Sixteen words hold a full
/// 512-bit digest, which is the widest output any stage produces.
pub const DEFAULT_BLOCK_WORDS: usize = 16;

/// Little-endian decomposition of `index` into `word_count` 32-bit words.
///
/// Word `j` holds bits `32*j .. 32*j+31` of the index; words past the 64-bit
/// width of the index are zero.
pub fn index_to_words(index: u64, word_count: usize) -> Vec<u32> {
    let mut words = vec![0u32; word_count];
    write_index_words(index, &mut words);
    words
}

/// In-place variant of [`index_to_words`].
pub fn write_index_words(index: u64, out: &mut [u32]) {
    for (j, word) in out.iter_mut().enumerate() {
        *word = if j < 2 { (index >> (32 * j)) as u32 } else { 0 };
    }
}

/// Inverse of [`index_to_words`].
///
/// Returns `None` if the words encode a value wider than 64 bits.
pub fn words_to_index(words: &[u32]) -> Option<u64> {
    if words.iter().skip(2).any(|&w| w != 0) {
        return None;
    }
    let lo = words.first().copied().unwrap_or(0) as u64;
    let hi = words.get(1).copied().unwrap_or(0) as u64;
    Some(lo | (hi << 32))
}

/// True iff the first `length` bytes of `h1` and `h2` are equal.
///
/// Bytes beyond `length` never matter. An operand shorter than `length`
/// never matches.
pub fn digests_match(h1: &[u8], h2: &[u8], length: usize) -> bool {
    match (h1.get(..length), h2.get(..length)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Produces batches of consecutive candidates.
///
/// Slot `k` of a batch starting at absolute index `start` always holds
/// candidate `start + k`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CandidateGenerator {
    block_words: usize,
}

impl CandidateGenerator {
    pub fn new(block_words: usize) -> Self {
        Self { block_words }
    }

    /// Words per candidate slot.
    pub fn block_words(&self) -> usize {
        self.block_words
    }

    /// Absolute index held by `slot` of a batch starting at `start`.
    pub fn slot_index(start: u64, slot: usize) -> u64 {
        start.wrapping_add(slot as u64)
    }

    /// Absolute index of the first candidate of batch `iteration`.
    pub fn batch_start(iteration: u64, batch_size: usize) -> u64 {
        iteration.wrapping_mul(batch_size as u64)
    }

    /// Encode consecutive candidates into `out`, one block per slot.
    ///
    /// Returns the number of slots written. A trailing partial block is left
    /// untouched.
    pub fn fill_batch(&self, start: u64, out: &mut [u32]) -> usize {
        if self.block_words == 0 {
            return 0;
        }
        let mut written = 0;
        for (slot, block) in out.chunks_exact_mut(self.block_words).enumerate() {
            write_index_words(Self::slot_index(start, slot), block);
            written += 1;
        }
        written
    }
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_WORDS)
    }
}
