//! Host implementations of the three pipeline stages.
//!
//! These agree bit for bit with the device kernels: digestA is SHA-512,
//! digestB is MD5, and combine XORs the two outputs after zero-padding the
//! shorter one. They back the host compute backend and let callers build
//! targets with a known preimage.

use md5::Md5;
use sha2::{Digest, Sha512};

/// Output length of digestA in bytes.
pub const DIGEST_A_LEN: usize = 64;
/// Output length of digestB in bytes.
pub const DIGEST_B_LEN: usize = 16;

/// The first `len` bytes of the little-endian encoding of `index`.
///
/// Lengths above eight bytes are zero-extended, matching the zero high words
/// of a candidate block.
pub fn candidate_bytes(index: u64, len: usize) -> Vec<u8> {
    let mut bytes = index.to_le_bytes().to_vec();
    bytes.resize(len, 0);
    bytes
}

pub fn digest_a(input: &[u8]) -> [u8; DIGEST_A_LEN] {
    let mut out = [0u8; DIGEST_A_LEN];
    out.copy_from_slice(&Sha512::digest(input));
    out
}

pub fn digest_b(input: &[u8]) -> [u8; DIGEST_B_LEN] {
    let mut out = [0u8; DIGEST_B_LEN];
    out.copy_from_slice(&Md5::digest(input));
    out
}

/// XOR of `a` and `b`, the shorter input padded with zero bytes.
pub fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0))
        .collect()
}

/// Full chain over raw candidate bytes.
pub fn chain(input: &[u8]) -> Vec<u8> {
    combine(&digest_a(input), &digest_b(input))
}

/// Full chain for the candidate at `index` encoded on `candidate_len` bytes.
pub fn chain_for_index(index: u64, candidate_len: usize) -> Vec<u8> {
    chain(&candidate_bytes(index, candidate_len))
}
