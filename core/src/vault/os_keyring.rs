//! OS credential vault backend.
//!
//! Maps each `(service, field)` pair onto one keyring entry with
//! `service` as the service and the field name as the user/account. This is
//! the layout the prototype wrote, so existing entries stay readable.

use keyring::Entry;

use super::store::{KeyField, KeyMaterialStore, StoreError};

/// [`KeyMaterialStore`] backed by the platform keyring.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsKeyringStore;

impl OsKeyringStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, field: KeyField) -> Result<Entry, StoreError> {
        Entry::new(service, field.as_str()).map_err(map_err)
    }
}

impl KeyMaterialStore for OsKeyringStore {
    fn set(&self, service: &str, field: KeyField, value: &str) -> Result<(), StoreError> {
        Self::entry(service, field)?.set_password(value).map_err(map_err)
    }

    fn get(&self, service: &str, field: KeyField) -> Result<Option<String>, StoreError> {
        match Self::entry(service, field)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_err(e)),
        }
    }

    fn delete(&self, service: &str, field: KeyField) -> Result<(), StoreError> {
        match Self::entry(service, field)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_err(e)),
        }
    }
}

fn map_err(e: keyring::Error) -> StoreError {
    match e {
        keyring::Error::NoStorageAccess(inner) => StoreError::AccessDenied(inner.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}
