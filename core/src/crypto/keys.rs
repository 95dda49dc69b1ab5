//! # Borg Keypairs
//!
//! Every borg owns one Ed25519 keypair. This module defines the value type
//! that moves between the registrar, the reconstructor and whatever signs
//! transfers on the borg's behalf.
//!
//! ## Storage layout
//!
//! The keystore persists three strings per borg:
//!
//! | field         | content                               | length   |
//! |---------------|---------------------------------------|----------|
//! | `private_key` | hex(seed ‖ public_key)                | 128 hex  |
//! | `public_key`  | hex(public_key)                       | 64 hex   |
//! | `address`     | SS58(public_key, prefix 42)           | 48 chars |
//!
//! The 64-byte private key is the expanded Ed25519 form: the 32-byte seed
//! followed by the public key it produces. Carrying the public half lets us
//! detect a private key that was spliced together from two different borgs.
//!
//! ## Security considerations
//!
//! - `Debug` never prints secret material.
//! - There is no `Serialize` impl. Writing a private key somewhere is done
//!   through [`BorgKeypair::private_key_hex`] on purpose.
//! - Key bytes are never logged.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

use super::ss58::{self, Ss58Error};
use crate::config::{PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH, SEED_LENGTH};

/// Errors that can occur while building a keypair from raw material.
///
/// Deliberately vague about the bytes involved.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("embedded public key does not match the seed")]
    EmbeddedPublicKeyMismatch,

    #[error("address encoding failed: {0}")]
    Address(#[from] Ss58Error),
}

/// A borg's keypair: private key, public key and derived address.
///
/// A plain value type. The signing key is rebuilt on demand from the seed
/// half of `private_key`, so the struct holds exactly the three values the
/// keystore persists.
///
/// # Examples
///
/// ```
/// use borglife_core::crypto::keys::BorgKeypair;
///
/// let kp = BorgKeypair::from_seed(&[7u8; 32], 42).unwrap();
/// assert_eq!(kp.address().len(), 48);
/// let sig = kp.sign(b"transfer 1 WND");
/// assert!(kp.verify(b"transfer 1 WND", &sig));
/// ```
#[derive(Clone)]
pub struct BorgKeypair {
    private_key: [u8; PRIVATE_KEY_LENGTH],
    public_key: [u8; PUBLIC_KEY_LENGTH],
    address: String,
}

impl BorgKeypair {
    /// Construct a keypair deterministically from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SEED_LENGTH], ss58_prefix: u16) -> Result<Self, KeyError> {
        Self::from_signing_key(&SigningKey::from_bytes(seed), ss58_prefix)
    }

    /// Generate a keypair from the OS RNG. Only useful for tests and
    /// throwaway accounts; borgs derive theirs from a DNA hash.
    pub fn generate(ss58_prefix: u16) -> Result<Self, KeyError> {
        Self::from_signing_key(&SigningKey::generate(&mut OsRng), ss58_prefix)
    }

    /// Rebuild a keypair from the 64-byte expanded private key.
    ///
    /// The public half is recomputed from the seed half and must equal the
    /// embedded copy.
    pub fn from_private_key(
        bytes: &[u8; PRIVATE_KEY_LENGTH],
        ss58_prefix: u16,
    ) -> Result<Self, KeyError> {
        let signing_key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|_| KeyError::EmbeddedPublicKeyMismatch)?;
        Self::from_signing_key(&signing_key, ss58_prefix)
    }

    fn from_signing_key(signing_key: &SigningKey, ss58_prefix: u16) -> Result<Self, KeyError> {
        let public_key = signing_key.verifying_key().to_bytes();
        let address = ss58::encode(&public_key, ss58_prefix)?;
        Ok(Self {
            private_key: signing_key.to_keypair_bytes(),
            public_key,
            address,
        })
    }

    /// The 64-byte expanded private key (seed ‖ public key).
    ///
    /// **Handle with care.** Whoever holds these bytes controls the borg's
    /// funds.
    pub fn private_key(&self) -> &[u8; PRIVATE_KEY_LENGTH] {
        &self.private_key
    }

    /// Raw 32-byte public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.public_key
    }

    /// SS58 address derived from the public key.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hex-encoded private key, 128 characters. This is the stored form.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }

    /// Hex-encoded public key, 64 characters.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// The ed25519-dalek signing key, rebuilt from the seed half.
    pub fn signing_key(&self) -> SigningKey {
        let mut seed = [0u8; SEED_LENGTH];
        seed.copy_from_slice(&self.private_key[..SEED_LENGTH]);
        SigningKey::from_bytes(&seed)
    }

    /// Sign a message. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key().sign(message).to_bytes()
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.public_key) else {
            return false;
        };
        verifying_key
            .verify(message, &Signature::from_bytes(signature))
            .is_ok()
    }
}

impl PartialEq for BorgKeypair {
    /// Identity is the public key. Secret bytes are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key && self.address == other.address
    }
}

impl Eq for BorgKeypair {}

impl fmt::Debug for BorgKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BorgKeypair(address={})", self.address)
    }
}

/// Parse a fixed-length hex string into a byte array.
///
/// Length is checked before decoding so oversized input is never allocated.
pub(crate) fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N], String> {
    if s.len() != N * 2 {
        return Err(format!("expected {} hex characters, got {}", N * 2, s.len()));
    }
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}
