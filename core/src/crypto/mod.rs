//! # Cryptographic Primitives
//!
//! Everything key-shaped in the keystore flows through here: Ed25519
//! keypairs, SS58 addresses, and the two hash families Substrate needs.
//!
//! We don't roll our own. Ed25519 comes from `ed25519-dalek`, hashing from
//! the RustCrypto `sha2`/`blake2` crates, base58 from `bs58`. This module
//! only fixes the byte layouts the keystore persists.

pub mod hash;
pub mod keys;
pub mod ss58;

pub use hash::{blake2b_256, sha256};
pub use keys::{BorgKeypair, KeyError};
pub use ss58::Ss58Error;
