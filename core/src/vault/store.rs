//! # Credential Vault Abstraction
//!
//! The keystore never talks to a concrete vault. It talks to
//! [`KeyMaterialStore`]: a flat `(service_name, field) -> string` map with
//! set/get/delete. That is the lowest common denominator of macOS Keychain,
//! Windows Credential Manager and the freedesktop Secret Service, and it is
//! all the registrar and reconstructor need.
//!
//! [`InMemoryKeyStore`] is the reference implementation: used by tests and
//! by embedders that keep key material in process memory.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Named fields stored under a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyField {
    PrivateKey,
    PublicKey,
    Address,
    /// Reverse-lookup hint written by service migration.
    BorgId,
}

impl KeyField {
    /// The three fields every complete key material record carries, in the
    /// order they are written.
    pub const REQUIRED: [KeyField; 3] = [KeyField::PrivateKey, KeyField::PublicKey, KeyField::Address];

    /// Field name as stored in the vault.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::PrivateKey => "private_key",
            KeyField::PublicKey => "public_key",
            KeyField::Address => "address",
            KeyField::BorgId => "borg_id",
        }
    }
}

impl fmt::Display for KeyField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a vault backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend refused or failed the operation.
    #[error("vault backend error: {0}")]
    Backend(String),

    /// The vault is locked or access was denied by the user.
    #[error("vault access denied: {0}")]
    AccessDenied(String),
}

/// A secure credential vault keyed by `(service_name, field)`.
///
/// Implementations must be safe to share across threads. No ordering or
/// transactional guarantees are expected between fields.
pub trait KeyMaterialStore: Send + Sync {
    /// Store `value` under `(service, field)`, overwriting any previous value.
    fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError>;

    /// Read the value under `(service, field)`. Absence is `Ok(None)`.
    fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError>;

    /// Delete `(service, field)`. Deleting an absent entry is not an error.
    fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError>;
}

impl<T: KeyMaterialStore + ?Sized> KeyMaterialStore for std::sync::Arc<T> {
    fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError> {
        (**self).set(service, field, value)
    }

    fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError> {
        (**self).get(service, field)
    }

    fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError> {
        (**self).delete(service, field)
    }
}

impl<T: KeyMaterialStore + ?Sized> KeyMaterialStore for &T {
    fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError> {
        (**self).set(service, field, value)
    }

    fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError> {
        (**self).get(service, field)
    }

    fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError> {
        (**self).delete(service, field)
    }
}

/// Process-local vault backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    entries: RwLock<HashMap<(String, KeyField), String>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored `(service, field)` entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Fields currently present under `service`, sorted.
    pub fn fields(&self, service: &str) -> Vec<KeyField> {
        let mut fields: Vec<KeyField> = self
            .entries
            .read()
            .keys()
            .filter(|(s, _)| s == service)
            .map(|(_, f)| *f)
            .collect();
        fields.sort();
        fields
    }
}

impl KeyMaterialStore for InMemoryKeyStore {
    fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert((service.to_string(), field), value.to_string());
        Ok(())
    }

    fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(&(service.to_string(), field)).cloned())
    }

    fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError> {
        self.entries.write().remove(&(service.to_string(), field));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_roundtrip() {
        let store = InMemoryKeyStore::new();
        store.set("svc", KeyField::Address, "5abc").unwrap();
        assert_eq!(store.get("svc", KeyField::Address).unwrap().as_deref(), Some("5abc"));
        store.delete("svc", KeyField::Address).unwrap();
        assert_eq!(store.get("svc", KeyField::Address).unwrap(), None);
    }

    #[test]
    fn delete_absent_is_not_an_error() {
        let store = InMemoryKeyStore::new();
        assert!(store.delete("nope", KeyField::PrivateKey).is_ok());
    }

    #[test]
    fn services_are_isolated() {
        let store = InMemoryKeyStore::new();
        store.set("a", KeyField::PublicKey, "aa").unwrap();
        store.set("b", KeyField::PublicKey, "bb").unwrap();
        assert_eq!(store.fields("a"), vec![KeyField::PublicKey]);
        assert_eq!(store.get("b", KeyField::PublicKey).unwrap().as_deref(), Some("bb"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn field_names_match_vault_layout() {
        let names: Vec<&str> = KeyField::REQUIRED.iter().map(KeyField::as_str).collect();
        assert_eq!(names, ["private_key", "public_key", "address"]);
    }
}
