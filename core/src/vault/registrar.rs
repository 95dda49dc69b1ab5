//! # Credential Registrar
//!
//! Writes the three key material fields for one service "atomically": the
//! vault has no transactions, so atomicity means write in order, remember
//! what landed, and delete it all again if a later write fails.
//!
//! Rollback is best-effort. A delete that fails during cleanup is logged at
//! `warn` and reported in [`BorgError::PartialWrite::leaked`]; it never
//! replaces the write error. After a leaked rollback, call
//! [`CredentialRegistrar::verify`] before reusing the service name.
//!
//! ## Concurrency
//!
//! No locking. Two concurrent `register` calls for the same service can
//! interleave their fields. Callers serialise registration per identity.

use crate::config::{PRIVATE_KEY_LENGTH, PUBLIC_KEY_LENGTH};
use crate::crypto::keys::{decode_hex_array, BorgKeypair};
use crate::crypto::ss58;
use crate::error::{BorgError, BorgResult};
use crate::vault::store::{KeyField, KeyMaterialStore};

/// Presence report from [`CredentialRegistrar::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPresence {
    pub present: Vec<KeyField>,
    pub missing: Vec<KeyField>,
}

impl FieldPresence {
    /// All three fields are present.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// No field is present.
    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Some but not all fields are present: a leaked partial write.
    pub fn is_partial(&self) -> bool {
        !self.is_complete() && !self.is_empty()
    }
}

/// Sole writer of key material records.
#[derive(Debug)]
pub struct CredentialRegistrar<S> {
    store: S,
}

impl<S: KeyMaterialStore> CredentialRegistrar<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store `private_key`, `public_key` and `address` under `service_name`.
    ///
    /// Input formats are checked before the first write. Re-registering
    /// with identical arguments overwrites with identical values.
    pub fn register(
        &self,
        service_name: &str,
        private_key_hex: &str,
        public_key_hex: &str,
        address: &str,
    ) -> BorgResult<()> {
        check_format(private_key_hex, public_key_hex, address)?;

        let fields = [
            (KeyField::PrivateKey, private_key_hex),
            (KeyField::PublicKey, public_key_hex),
            (KeyField::Address, address),
        ];
        self.write_all(service_name, &fields)?;

        tracing::info!(service_name, address, "key material registered");
        Ok(())
    }

    /// Convenience wrapper taking a keypair.
    pub fn register_keypair(&self, service_name: &str, keypair: &BorgKeypair) -> BorgResult<()> {
        self.register(
            service_name,
            &keypair.private_key_hex(),
            &keypair.public_key_hex(),
            keypair.address(),
        )
    }

    /// Write fields in order with rollback. Also used by service migration
    /// for its extra `borg_id` field.
    pub(crate) fn write_all(&self, service_name: &str, fields: &[(KeyField, &str)]) -> BorgResult<()> {
        let mut written: Vec<KeyField> = Vec::with_capacity(fields.len());

        for (field, value) in fields {
            if let Err(source) = self.store.set(service_name, *field, value) {
                let (rolled_back, leaked) = self.rollback(service_name, &written);
                tracing::error!(
                    service_name,
                    failed_field = %field,
                    error = %source,
                    rolled_back = ?rolled_back,
                    leaked = ?leaked,
                    "key material write failed"
                );
                return Err(BorgError::PartialWrite {
                    service_name: service_name.to_string(),
                    failed_field: *field,
                    source,
                    rolled_back,
                    leaked,
                });
            }
            written.push(*field);
        }
        Ok(())
    }

    /// Delete every field in `written`, in reverse. Returns (deleted, leaked).
    fn rollback(&self, service_name: &str, written: &[KeyField]) -> (Vec<KeyField>, Vec<KeyField>) {
        let mut rolled_back = Vec::new();
        let mut leaked = Vec::new();
        for field in written.iter().rev() {
            match self.store.delete(service_name, *field) {
                Ok(()) => rolled_back.push(*field),
                Err(e) => {
                    tracing::warn!(
                        service_name,
                        field = %field,
                        error = %e,
                        "rollback delete failed; partial key material leaked"
                    );
                    leaked.push(*field);
                }
            }
        }
        (rolled_back, leaked)
    }

    /// Read back the three fields and report which are present.
    pub fn verify(&self, service_name: &str) -> BorgResult<FieldPresence> {
        let mut present = Vec::new();
        let mut missing = Vec::new();
        for field in KeyField::REQUIRED {
            if self.store.get(service_name, field)?.is_some() {
                present.push(field);
            } else {
                missing.push(field);
            }
        }
        Ok(FieldPresence { present, missing })
    }
}

fn check_format(private_key_hex: &str, public_key_hex: &str, address: &str) -> BorgResult<()> {
    decode_hex_array::<PRIVATE_KEY_LENGTH>(private_key_hex).map_err(|reason| {
        BorgError::InvalidKeyFormat {
            field: KeyField::PrivateKey,
            reason,
        }
    })?;
    decode_hex_array::<PUBLIC_KEY_LENGTH>(public_key_hex).map_err(|reason| {
        BorgError::InvalidKeyFormat {
            field: KeyField::PublicKey,
            reason,
        }
    })?;
    ss58::decode(address).map_err(|e| BorgError::InvalidKeyFormat {
        field: KeyField::Address,
        reason: e.to_string(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derivation::derive_from_dna_hash;
    use crate::vault::store::InMemoryKeyStore;

    fn alice() -> BorgKeypair {
        derive_from_dna_hash(&"a".repeat(64), 42).unwrap()
    }

    #[test]
    fn register_writes_all_three_fields() {
        let registrar = CredentialRegistrar::new(InMemoryKeyStore::new());
        let kp = alice();
        registrar.register_keypair("svc", &kp).unwrap();

        let store = registrar.store();
        assert_eq!(store.get("svc", KeyField::PrivateKey).unwrap(), Some(kp.private_key_hex()));
        assert_eq!(store.get("svc", KeyField::PublicKey).unwrap(), Some(kp.public_key_hex()));
        assert_eq!(store.get("svc", KeyField::Address).unwrap().as_deref(), Some(kp.address()));
        assert!(registrar.verify("svc").unwrap().is_complete());
    }

    #[test]
    fn register_is_idempotent() {
        let registrar = CredentialRegistrar::new(InMemoryKeyStore::new());
        let kp = alice();
        registrar.register_keypair("svc", &kp).unwrap();
        let once = registrar.store().len();
        registrar.register_keypair("svc", &kp).unwrap();
        assert_eq!(registrar.store().len(), once);
        assert_eq!(
            registrar.store().get("svc", KeyField::PublicKey).unwrap(),
            Some(kp.public_key_hex())
        );
    }

    #[test]
    fn malformed_input_never_reaches_store() {
        let registrar = CredentialRegistrar::new(InMemoryKeyStore::new());
        let kp = alice();
        let err = registrar
            .register("svc", &kp.private_key_hex()[1..], &kp.public_key_hex(), kp.address())
            .unwrap_err();
        assert!(matches!(
            err,
            BorgError::InvalidKeyFormat { field: KeyField::PrivateKey, .. }
        ));
        assert!(registrar.store().is_empty());
    }

    #[test]
    fn verify_reports_partial_state() {
        let registrar = CredentialRegistrar::new(InMemoryKeyStore::new());
        registrar.store().set("svc", KeyField::PrivateKey, "00").unwrap();
        let presence = registrar.verify("svc").unwrap();
        assert!(presence.is_partial());
        assert_eq!(presence.missing, vec![KeyField::PublicKey, KeyField::Address]);
    }
}
