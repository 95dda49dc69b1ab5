//! # Creator Authorization
//!
//! A borg may be registered on behalf of a creator who holds their own
//! Ed25519 key. The creator signs
//!
//! ```text
//! register_borg:<identifier>:<dna_hash>:<address>
//! ```
//!
//! and the manager refuses the registration unless the signature verifies.
//! The creator's public key is then kept on the registry row so later
//! operations can check against it.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::config::{PUBLIC_KEY_LENGTH, REGISTRATION_OPERATION, SIGNATURE_LENGTH};
use crate::crypto::keys::{decode_hex_array, BorgKeypair};
use crate::error::{BorgError, BorgResult};

/// The message a creator signs to authorize registering `address`.
pub fn registration_message(identifier: &str, dna_hash: &str, address: &str) -> String {
    format!("{REGISTRATION_OPERATION}:{identifier}:{dna_hash}:{address}")
}

/// A creator's public key and signature over the registration message,
/// both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorAuthorization {
    pub public_key: String,
    pub signature: String,
}

impl CreatorAuthorization {
    pub fn new(public_key: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            signature: signature.into(),
        }
    }

    /// Sign the registration of `address` with the creator's keypair.
    pub fn sign(creator: &BorgKeypair, identifier: &str, dna_hash: &str, address: &str) -> Self {
        let message = registration_message(identifier, dna_hash, address);
        Self {
            public_key: creator.public_key_hex(),
            signature: hex::encode(creator.sign(message.as_bytes())),
        }
    }

    /// Check the signature over the registration message for these values.
    pub fn verify(&self, identifier: &str, dna_hash: &str, address: &str) -> BorgResult<()> {
        let reject = |reason: String| {
            tracing::warn!(identifier, %reason, "creator authorization rejected");
            BorgError::CreatorUnauthorized {
                identifier: identifier.to_string(),
                reason,
            }
        };

        let key_bytes = decode_hex_array::<PUBLIC_KEY_LENGTH>(&self.public_key)
            .map_err(|e| reject(format!("creator public key: {e}")))?;
        let sig_bytes = decode_hex_array::<SIGNATURE_LENGTH>(&self.signature)
            .map_err(|e| reject(format!("signature: {e}")))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| reject("creator public key is not a valid curve point".into()))?;

        let message = registration_message(identifier, dna_hash, address);
        verifying_key
            .verify(message.as_bytes(), &Signature::from_bytes(&sig_bytes))
            .map_err(|_| reject("signature does not verify".into()))
    }
}
