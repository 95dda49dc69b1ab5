//! # Hashing Utilities
//!
//! Two hash families, each with a fixed job:
//!
//! - **SHA-256** turns free-form seed phrases into 32-byte Ed25519 seeds.
//! - **BLAKE2b** is what Substrate speaks. The SS58 checksum is BLAKE2b-512
//!   over a fixed preamble, and DNA hashes are BLAKE2b-256 digests of
//!   canonical DNA content, so we need both widths.
//!
//! Nothing here is novel. These are thin, typed wrappers so the rest of the
//! crate never touches a `Digest` impl directly.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Blake2b512, Digest};
use sha2::Sha256;

/// BLAKE2b with a 32-byte output.
type Blake2b256 = Blake2b<U32>;

/// Compute the SHA-256 hash of the input data as a fixed-size array.
///
/// # Example
///
/// ```
/// use borglife_core::crypto::hash::sha256;
///
/// let digest = sha256(b"borglife");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Compute BLAKE2b-256 of the input data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Compute BLAKE2b-512 over several byte slices fed in sequence.
///
/// Used for the SS58 checksum, which hashes `"SS58PRE" || payload` without
/// us having to allocate the concatenation.
pub fn blake2b_512_multi(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 64];
    output.copy_from_slice(&hasher.finalize());
    output
}
