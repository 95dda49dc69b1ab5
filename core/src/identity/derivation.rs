//! # Address Derivation
//!
//! DNA hash in, keypair out. The 32 bytes of the DNA hash are the Ed25519
//! seed, so re-deriving from the hash always lands on the same address:
//!
//! ```text
//! dna_hash (64 hex)
//!     -> 32-byte seed
//!     -> Ed25519 keypair
//!     -> SS58(public_key, 42) -> 5...
//! ```
//!
//! That determinism is what lets us verify stored key material against a
//! registry row without ever storing a seed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{DNA_HASH_HEX_LENGTH, SEED_LENGTH};
use crate::crypto::hash::{blake2b_256, sha256};
use crate::crypto::keys::BorgKeypair;
use crate::error::{BorgError, BorgResult};

/// A validated, lowercase 64-hex DNA hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DnaHash(String);

impl DnaHash {
    /// Validate and normalise a DNA hash string.
    ///
    /// Exactly 64 hex characters, either case. Stored lowercase so that two
    /// spellings of one hash compare equal.
    pub fn parse(s: &str) -> BorgResult<Self> {
        if s.len() != DNA_HASH_HEX_LENGTH {
            return Err(BorgError::InvalidInput(format!(
                "DNA hash must be {DNA_HASH_HEX_LENGTH} hex characters, got {}",
                s.len()
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BorgError::InvalidInput("DNA hash is not hex".into()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Hash canonical DNA content (BLAKE2b-256).
    pub fn of_content(content: &[u8]) -> Self {
        Self(hex::encode(blake2b_256(content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The seed bytes this hash encodes.
    pub fn seed(&self) -> [u8; SEED_LENGTH] {
        let mut seed = [0u8; SEED_LENGTH];
        // Validated in `parse`; both constructors guarantee 64 hex chars.
        hex::decode_to_slice(&self.0, &mut seed).unwrap_or_default();
        seed
    }

    /// Short form for logs: first 16 characters.
    pub fn prefix(&self) -> &str {
        &self.0[..16]
    }
}

impl fmt::Display for DnaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DnaHash {
    type Error = BorgError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<DnaHash> for String {
    fn from(h: DnaHash) -> Self {
        h.0
    }
}

/// Derive a borg keypair from its DNA hash.
pub fn derive_keypair(dna_hash: &DnaHash, ss58_prefix: u16) -> BorgResult<BorgKeypair> {
    let keypair = BorgKeypair::from_seed(&dna_hash.seed(), ss58_prefix)
        .map_err(|e| BorgError::InvalidInput(e.to_string()))?;
    tracing::debug!(
        dna_hash_prefix = dna_hash.prefix(),
        address = keypair.address(),
        "derived deterministic keypair"
    );
    Ok(keypair)
}

/// Parse a raw DNA hash string and derive its keypair in one step.
pub fn derive_from_dna_hash(dna_hash: &str, ss58_prefix: u16) -> BorgResult<BorgKeypair> {
    derive_keypair(&DnaHash::parse(dna_hash)?, ss58_prefix)
}

/// Derive a keypair from a seed.
///
/// Accepts a raw 32-byte hex seed (with or without `0x`). Any other
/// non-empty phrase is hashed with SHA-256 into a seed. Phrases are not
/// BIP-39 mnemonics; accounts created from a mnemonic elsewhere will not
/// match.
pub fn derive_from_seed(seed: &str, ss58_prefix: u16) -> BorgResult<BorgKeypair> {
    let trimmed = seed.trim();
    if trimmed.is_empty() {
        return Err(BorgError::InvalidInput("seed is empty".into()));
    }
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    let seed_bytes = if raw.len() == SEED_LENGTH * 2 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        let mut bytes = [0u8; SEED_LENGTH];
        hex::decode_to_slice(raw, &mut bytes)
            .map_err(|e| BorgError::InvalidInput(format!("seed hex: {e}")))?;
        bytes
    } else if trimmed.starts_with("0x") {
        return Err(BorgError::InvalidInput(
            "0x-prefixed seed must be 64 hex characters".into(),
        ));
    } else {
        sha256(trimmed.as_bytes())
    };

    BorgKeypair::from_seed(&seed_bytes, ss58_prefix).map_err(|e| BorgError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SS58_GENERIC_PREFIX;

    #[test]
    fn same_hash_same_address() {
        let hash = "ab".repeat(32);
        let a = derive_from_dna_hash(&hash, SS58_GENERIC_PREFIX).unwrap();
        let b = derive_from_dna_hash(&hash, SS58_GENERIC_PREFIX).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(a.private_key(), b.private_key());
    }

    #[test]
    fn determinism_over_many_hashes() {
        for i in 0u8..32 {
            let hash = DnaHash::of_content(&[i; 7]);
            let a = derive_keypair(&hash, SS58_GENERIC_PREFIX).unwrap();
            let b = derive_keypair(&DnaHash::parse(hash.as_str()).unwrap(), SS58_GENERIC_PREFIX).unwrap();
            assert_eq!(a.address(), b.address());
        }
    }

    #[test]
    fn hash_case_is_normalised() {
        let lower = DnaHash::parse(&"ab".repeat(32)).unwrap();
        let upper = DnaHash::parse(&"AB".repeat(32)).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(
            derive_keypair(&lower, 42).unwrap().address(),
            derive_keypair(&upper, 42).unwrap().address()
        );
    }

    #[test]
    fn seed_is_the_hash_bytes() {
        let hash = DnaHash::parse(&"a".repeat(64)).unwrap();
        assert_eq!(hash.seed(), [0xaa; 32]);
    }

    #[test]
    fn malformed_hashes_rejected() {
        for bad in ["", "abc", &"a".repeat(63), &"a".repeat(65), &"g".repeat(64)] {
            assert!(
                matches!(DnaHash::parse(bad), Err(BorgError::InvalidInput(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn different_hashes_different_addresses() {
        let a = derive_from_dna_hash(&"a".repeat(64), 42).unwrap();
        let b = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn hex_seed_matches_dna_derivation() {
        let hash = "cd".repeat(32);
        let from_dna = derive_from_dna_hash(&hash, 42).unwrap();
        let from_seed = derive_from_seed(&format!("0x{hash}"), 42).unwrap();
        let bare = derive_from_seed(&hash, 42).unwrap();
        assert_eq!(from_dna, from_seed);
        assert_eq!(from_dna, bare);
    }

    #[test]
    fn phrase_seed_is_deterministic() {
        let a = derive_from_seed("dispenser phrase", 42).unwrap();
        let b = derive_from_seed("dispenser phrase", 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_seeds_rejected() {
        assert!(derive_from_seed("   ", 42).is_err());
        assert!(derive_from_seed("0x1234", 42).is_err());
    }

    #[test]
    fn dna_hash_serde_validates() {
        let ok: DnaHash = serde_json::from_str(&format!("\"{}\"", "f".repeat(64))).unwrap();
        assert_eq!(ok.as_str().len(), 64);
        assert!(serde_json::from_str::<DnaHash>("\"nothex\"").is_err());
    }
}
