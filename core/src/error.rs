//! Error taxonomy for keystore operations.
//!
//! Every public operation that can fail returns a [`BorgError`]. The first
//! six variants are the keystore's own failure modes; the rest wrap the
//! collaborators (credential vault, registry, local fallback files, transfer
//! executor) so nothing is swallowed on the way up.

use thiserror::Error;

use crate::storage::local::LocalIndexError;
use crate::storage::registry::RegistryError;
use crate::transfer::TransferError;
use crate::vault::store::{KeyField, StoreError};

/// Which comparison failed during integrity verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchKind {
    /// Public key derived from the private key differs from the stored one.
    PublicKey,
    /// The public half embedded in the 64-byte private key differs from the
    /// one derived from its seed half.
    EmbeddedPublicKey,
    /// Derived address differs from the stored `address` field.
    StoredAddress { stored: String, derived: String },
    /// Derived address differs from the address the caller expected.
    ExpectedAddress { expected: String, derived: String },
    /// The rebuilt key failed to verify its own signature.
    SelfTest,
}

impl std::fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchKind::PublicKey => write!(f, "stored public key does not match private key"),
            MismatchKind::EmbeddedPublicKey => {
                write!(f, "private key carries a foreign public key")
            }
            MismatchKind::StoredAddress { stored, derived } => {
                write!(f, "stored address {stored} != derived {derived}")
            }
            MismatchKind::ExpectedAddress { expected, derived } => {
                write!(f, "expected address {expected} != derived {derived}")
            }
            MismatchKind::SelfTest => write!(f, "signing self-test failed"),
        }
    }
}

/// Errors surfaced by the keystore.
#[derive(Debug, Error)]
pub enum BorgError {
    /// Malformed DNA hash, seed, identifier or address.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A credential write failed midway and was rolled back.
    ///
    /// `leaked` lists fields whose cleanup delete also failed. Those may
    /// still be present in the vault.
    #[error(
        "partial write to {service_name}: writing {failed_field} failed ({source}); \
         rolled back {rolled_back:?}, leaked {leaked:?}"
    )]
    PartialWrite {
        service_name: String,
        failed_field: KeyField,
        #[source]
        source: StoreError,
        rolled_back: Vec<KeyField>,
        leaked: Vec<KeyField>,
    },

    /// A creator authorization was supplied and did not verify.
    #[error("creator authorization for '{identifier}' rejected: {reason}")]
    CreatorUnauthorized { identifier: String, reason: String },

    /// Every resolution strategy was exhausted.
    #[error("no identity found for '{identifier}'")]
    IdentityNotFound { identifier: String },

    /// One or more required fields are absent from the vault.
    #[error("key material missing under {service_name}: {missing:?}")]
    KeyMaterialMissing {
        service_name: String,
        missing: Vec<KeyField>,
    },

    /// A stored field has the wrong length or charset.
    #[error("invalid {field} format: {reason}")]
    InvalidKeyFormat { field: KeyField, reason: String },

    /// Derived and stored material disagree. Always fatal.
    #[error("integrity mismatch under {service_name}: {kind}")]
    IntegrityMismatch {
        service_name: String,
        kind: MismatchKind,
    },

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("local fallback error: {0}")]
    LocalIndex(#[from] LocalIndexError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

pub type BorgResult<T> = Result<T, BorgError>;

impl BorgError {
    /// A short operator-facing hint for UIs and scripts.
    pub fn remediation(&self) -> &'static str {
        match self {
            BorgError::InvalidInput(_) => "check the DNA hash, seed or identifier format",
            BorgError::PartialWrite { leaked, .. } if !leaked.is_empty() => {
                "partial key material leaked; inspect the vault entry and re-register"
            }
            BorgError::PartialWrite { .. } => "vault write failed; retry registration",
            BorgError::CreatorUnauthorized { .. } => {
                "creator signature invalid; re-sign register_borg:<id>:<dna_hash>:<address>"
            }
            BorgError::IdentityNotFound { .. } => "borg not registered; run setup first",
            BorgError::KeyMaterialMissing { .. } => {
                "key material incomplete; re-register the borg from its DNA hash"
            }
            BorgError::InvalidKeyFormat { .. } => "stored key is malformed; possible corruption",
            BorgError::IntegrityMismatch { .. } => "possible tampering detected; do not use this key",
            BorgError::Store(_) => "credential vault unavailable; check keyring access",
            BorgError::Registry(RegistryError::Conflict(_)) => {
                "identifier or address already bound to another borg"
            }
            BorgError::Registry(_) => "metadata registry unavailable; retry later",
            BorgError::LocalIndex(_) => "local fallback record unreadable",
            BorgError::Transfer(_) => "transfer was not confirmed; check the chain client",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_distinguishes_tampering_from_missing() {
        let tamper = BorgError::IntegrityMismatch {
            service_name: "borglife-address-x".into(),
            kind: MismatchKind::PublicKey,
        };
        let missing = BorgError::IdentityNotFound {
            identifier: "alice".into(),
        };
        assert!(tamper.remediation().contains("tampering"));
        assert!(missing.remediation().contains("setup"));
    }

    #[test]
    fn leaked_partial_write_has_its_own_hint() {
        let err = BorgError::PartialWrite {
            service_name: "svc".into(),
            failed_field: KeyField::PublicKey,
            source: StoreError::Backend("boom".into()),
            rolled_back: vec![],
            leaked: vec![KeyField::PrivateKey],
        };
        assert!(err.remediation().contains("leaked"));
        assert!(err.to_string().contains("public_key"));
    }
}
