//! # Keypair Reconstruction
//!
//! Reads stored key material back and proves it is what it claims to be
//! before anyone signs with it.
//!
//! ```text
//! KEY_READ           private_key (128 hex?) -> public_key -> both present?
//! INTEGRITY_CHECKED  seed -> derived public == stored public
//!                         -> derived public == embedded public half
//!                         -> derived address == stored address (if any)
//!                         -> derived address == expected address (if any)
//!                         -> sign/verify probe
//! READY
//! ```
//!
//! Any failed comparison is an [`BorgError::IntegrityMismatch`] and fatal.
//! A partially validated keypair is never returned, and nothing is retried.

use crate::config::{PRIVATE_KEY_HEX_LENGTH, PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH, SEED_LENGTH, SELF_TEST_MESSAGE};
use crate::crypto::keys::{decode_hex_array, BorgKeypair, KeyError};
use crate::error::{BorgError, BorgResult, MismatchKind};
use crate::vault::store::{KeyField, KeyMaterialStore};

/// Rebuilds and validates keypairs from a [`KeyMaterialStore`].
#[derive(Debug)]
pub struct KeypairReconstructor<'a, S> {
    store: &'a S,
    ss58_prefix: u16,
}

impl<'a, S: KeyMaterialStore> KeypairReconstructor<'a, S> {
    pub fn new(store: &'a S, ss58_prefix: u16) -> Self {
        Self { store, ss58_prefix }
    }

    /// Reconstruct the keypair stored under `service_name`.
    ///
    /// When `expected_address` is given (usually from the resolver) the
    /// derived address must equal it.
    pub fn reconstruct(
        &self,
        service_name: &str,
        expected_address: Option<&str>,
    ) -> BorgResult<BorgKeypair> {
        let private_hex = self.store.get(service_name, KeyField::PrivateKey)?;
        if let Some(hex) = &private_hex {
            if hex.len() != PRIVATE_KEY_HEX_LENGTH {
                return Err(BorgError::InvalidKeyFormat {
                    field: KeyField::PrivateKey,
                    reason: format!(
                        "expected {PRIVATE_KEY_HEX_LENGTH} hex characters, got {}",
                        hex.len()
                    ),
                });
            }
        }
        let public_hex = self.store.get(service_name, KeyField::PublicKey)?;

        let (private_hex, public_hex) = match (private_hex, public_hex) {
            (Some(private), Some(public)) => (private, public),
            (private, public) => {
                let missing = [(KeyField::PrivateKey, private.is_none()), (KeyField::PublicKey, public.is_none())]
                    .into_iter()
                    .filter_map(|(field, absent)| absent.then_some(field))
                    .collect();
                return Err(BorgError::KeyMaterialMissing {
                    service_name: service_name.to_string(),
                    missing,
                });
            }
        };

        let private_key = decode_hex_array::<PRIVATE_KEY_LENGTH>(&private_hex).map_err(|reason| {
            BorgError::InvalidKeyFormat {
                field: KeyField::PrivateKey,
                reason,
            }
        })?;
        let stored_public = decode_hex_array::<PUBLIC_KEY_LENGTH>(&public_hex).map_err(|reason| {
            BorgError::InvalidKeyFormat {
                field: KeyField::PublicKey,
                reason,
            }
        })?;

        let mut seed = [0u8; SEED_LENGTH];
        seed.copy_from_slice(&private_key[..SEED_LENGTH]);
        let derived = BorgKeypair::from_seed(&seed, self.ss58_prefix)
            .map_err(|e| BorgError::InvalidInput(e.to_string()))?;

        let mismatch = |kind: MismatchKind| {
            tracing::warn!(service_name, %kind, "key material failed integrity check");
            BorgError::IntegrityMismatch {
                service_name: service_name.to_string(),
                kind,
            }
        };

        if derived.public_key() != &stored_public {
            return Err(mismatch(MismatchKind::PublicKey));
        }
        let derived = BorgKeypair::from_private_key(&private_key, self.ss58_prefix).map_err(|e| match e {
            KeyError::EmbeddedPublicKeyMismatch => mismatch(MismatchKind::EmbeddedPublicKey),
            other => BorgError::InvalidInput(other.to_string()),
        })?;

        if let Some(stored) = self.store.get(service_name, KeyField::Address)? {
            if stored != derived.address() {
                return Err(mismatch(MismatchKind::StoredAddress {
                    stored,
                    derived: derived.address().to_string(),
                }));
            }
        }
        if let Some(expected) = expected_address {
            if expected != derived.address() {
                return Err(mismatch(MismatchKind::ExpectedAddress {
                    expected: expected.to_string(),
                    derived: derived.address().to_string(),
                }));
            }
        }

        let signature = derived.sign(SELF_TEST_MESSAGE);
        if !derived.verify(SELF_TEST_MESSAGE, &signature) {
            return Err(mismatch(MismatchKind::SelfTest));
        }

        tracing::debug!(service_name, address = derived.address(), "keypair reconstructed");
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derivation::derive_from_dna_hash;
    use crate::vault::registrar::CredentialRegistrar;
    use crate::vault::store::{InMemoryKeyStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SVC: &str = "borglife-address-test";

    fn stored_alice() -> (InMemoryKeyStore, BorgKeypair) {
        let kp = derive_from_dna_hash(&"a".repeat(64), 42).unwrap();
        let store = InMemoryKeyStore::new();
        CredentialRegistrar::new(&store).register_keypair(SVC, &kp).unwrap();
        (store, kp)
    }

    /// Counts `get` calls so tests can assert early exits.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryKeyStore,
        gets: AtomicUsize,
    }

    impl KeyMaterialStore for CountingStore {
        fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError> {
            self.inner.set(service, field, value)
        }
        fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(service, field)
        }
        fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError> {
            self.inner.delete(service, field)
        }
    }

    #[test]
    fn valid_material_reconstructs() {
        let (store, kp) = stored_alice();
        let rebuilt = KeypairReconstructor::new(&store, 42)
            .reconstruct(SVC, Some(kp.address()))
            .unwrap();
        assert_eq!(rebuilt, kp);
        assert_eq!(rebuilt.private_key(), kp.private_key());
    }

    #[test]
    fn tampered_public_key_detected() {
        let (store, _) = stored_alice();
        let other = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        store.set(SVC, KeyField::PublicKey, &other.public_key_hex()).unwrap();

        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        assert!(matches!(
            err,
            BorgError::IntegrityMismatch { kind: MismatchKind::PublicKey, .. }
        ));
    }

    #[test]
    fn spliced_private_key_detected() {
        let (store, kp) = stored_alice();
        let other = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        let spliced = format!("{}{}", &kp.private_key_hex()[..64], other.public_key_hex());
        store.set(SVC, KeyField::PrivateKey, &spliced).unwrap();

        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        assert!(matches!(
            err,
            BorgError::IntegrityMismatch { kind: MismatchKind::EmbeddedPublicKey, .. }
        ));
    }

    #[test]
    fn wrong_expected_address_detected() {
        let (store, _) = stored_alice();
        let other = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        let err = KeypairReconstructor::new(&store, 42)
            .reconstruct(SVC, Some(other.address()))
            .unwrap_err();
        assert!(matches!(
            err,
            BorgError::IntegrityMismatch { kind: MismatchKind::ExpectedAddress { .. }, .. }
        ));
    }

    #[test]
    fn tampered_stored_address_detected() {
        let (store, _) = stored_alice();
        let other = derive_from_dna_hash(&"c".repeat(64), 42).unwrap();
        store.set(SVC, KeyField::Address, other.address()).unwrap();
        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        assert!(matches!(
            err,
            BorgError::IntegrityMismatch { kind: MismatchKind::StoredAddress { .. }, .. }
        ));
    }

    #[test]
    fn missing_fields_all_named() {
        let store = InMemoryKeyStore::new();
        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        match err {
            BorgError::KeyMaterialMissing { missing, .. } => {
                assert_eq!(missing, vec![KeyField::PrivateKey, KeyField::PublicKey]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_private_key_rejected_before_further_reads() {
        let store = CountingStore::default();
        store.set(SVC, KeyField::PrivateKey, &"a".repeat(127)).unwrap();
        store.set(SVC, KeyField::PublicKey, &"a".repeat(64)).unwrap();

        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        assert!(matches!(
            err,
            BorgError::InvalidKeyFormat { field: KeyField::PrivateKey, .. }
        ));
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_hex_public_key_rejected() {
        let (store, _) = stored_alice();
        store.set(SVC, KeyField::PublicKey, &"z".repeat(64)).unwrap();
        let err = KeypairReconstructor::new(&store, 42).reconstruct(SVC, None).unwrap_err();
        assert!(matches!(
            err,
            BorgError::InvalidKeyFormat { field: KeyField::PublicKey, .. }
        ));
    }
}
