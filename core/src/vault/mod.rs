//! # Vault Module: Key Material Custody
//!
//! Private keys never touch the registry. They live in a credential vault
//! under a service name, one entry per field:
//!
//! ```text
//! store.rs      — KeyMaterialStore trait, field names, in-memory store
//! registrar.rs  — atomic three-field write with rollback
//! os_keyring.rs — macOS Keychain / Windows Credential Manager / Secret
//!                 Service backend (feature `os-keyring`)
//! ```
//!
//! ## Design Principles
//!
//! 1. **One writer.** Only [`CredentialRegistrar`] writes key material, so
//!    the all-or-nothing rule is enforced in exactly one place.
//!
//! 2. **Vaults are dumb.** A backend only needs set/get/delete on strings.
//!    Ordering, rollback and validation live above it.

pub mod registrar;
pub mod store;

#[cfg(feature = "os-keyring")]
pub mod os_keyring;

pub use registrar::{CredentialRegistrar, FieldPresence};
pub use store::{InMemoryKeyStore, KeyField, KeyMaterialStore, StoreError};

#[cfg(feature = "os-keyring")]
pub use os_keyring::OsKeyringStore;
