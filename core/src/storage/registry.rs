//! # Metadata Registry
//!
//! The relational side of a borg: which identifier owns which address, what
//! DNA hash it came from, its status and its balances. In production this
//! is a remote database; the keystore only sees the [`MetadataRegistry`]
//! trait.
//!
//! ## Keys
//!
//! Rows are keyed by address. The identifier is a unique secondary key.
//! `upsert` is idempotent for an unchanged row and rejects any attempt to
//! rebind either key:
//!
//! ```text
//! existing (alice, 5Grw..)   upsert (alice, 5Grw..)  -> update
//! existing (alice, 5Grw..)   upsert (bob,   5Grw..)  -> Conflict
//! existing (alice, 5Grw..)   upsert (alice, 5FHn..)  -> Conflict
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use super::balance::Currency;
use crate::identity::record::{BorgIdentity, BorgStatus};

/// Errors reported by a registry backend.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The write would rebind an existing address or identifier.
    #[error("registry conflict: {0}")]
    Conflict(String),

    #[error("no registry row for {0}")]
    NotFound(String),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend is unreachable or refused the request.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Borg metadata store keyed by address.
pub trait MetadataRegistry: Send + Sync {
    /// Insert or update the row for `identity.address`.
    fn upsert(&self, identity: &BorgIdentity) -> RegistryResult<()>;

    fn find_by_identifier(&self, identifier: &str) -> RegistryResult<Option<BorgIdentity>>;

    fn find_by_address(&self, address: &str) -> RegistryResult<Option<BorgIdentity>>;

    /// Change the status of an existing row. `NotFound` if there is none.
    fn update_status(&self, address: &str, status: BorgStatus) -> RegistryResult<()>;

    /// Every row, ordered by identifier.
    fn list(&self) -> RegistryResult<Vec<BorgIdentity>>;

    /// Create zero balances for every currency. Existing rows are kept.
    fn init_balances(&self, address: &str) -> RegistryResult<()>;

    fn set_balance(&self, address: &str, currency: Currency, amount: u64) -> RegistryResult<()>;

    fn balance(&self, address: &str, currency: Currency) -> RegistryResult<Option<u64>>;
}

impl<T: MetadataRegistry + ?Sized> MetadataRegistry for std::sync::Arc<T> {
    fn upsert(&self, identity: &BorgIdentity) -> RegistryResult<()> {
        (**self).upsert(identity)
    }

    fn find_by_identifier(&self, identifier: &str) -> RegistryResult<Option<BorgIdentity>> {
        (**self).find_by_identifier(identifier)
    }

    fn find_by_address(&self, address: &str) -> RegistryResult<Option<BorgIdentity>> {
        (**self).find_by_address(address)
    }

    fn update_status(&self, address: &str, status: BorgStatus) -> RegistryResult<()> {
        (**self).update_status(address, status)
    }

    fn list(&self) -> RegistryResult<Vec<BorgIdentity>> {
        (**self).list()
    }

    fn init_balances(&self, address: &str) -> RegistryResult<()> {
        (**self).init_balances(address)
    }

    fn set_balance(&self, address: &str, currency: Currency, amount: u64) -> RegistryResult<()> {
        (**self).set_balance(address, currency, amount)
    }

    fn balance(&self, address: &str, currency: Currency) -> RegistryResult<Option<u64>> {
        (**self).balance(address, currency)
    }
}

/// Shared upsert rule for every backend.
///
/// Returns the row to persist: `created_at` sticks to the first insert and
/// a recorded creator key can be neither replaced nor dropped.
pub(crate) fn merge_upsert(
    by_address: Option<&BorgIdentity>,
    by_identifier: Option<&BorgIdentity>,
    incoming: &BorgIdentity,
) -> RegistryResult<BorgIdentity> {
    if let Some(existing) = by_address {
        if existing.identifier != incoming.identifier {
            return Err(RegistryError::Conflict(format!(
                "address {} already belongs to '{}'",
                incoming.address, existing.identifier
            )));
        }
        if existing.dna_hash != incoming.dna_hash {
            return Err(RegistryError::Conflict(format!(
                "address {} is bound to a different DNA hash",
                incoming.address
            )));
        }
    }
    if let Some(existing) = by_identifier {
        if existing.address != incoming.address {
            return Err(RegistryError::Conflict(format!(
                "identifier '{}' already maps to {}",
                incoming.identifier, existing.address
            )));
        }
    }

    let mut row = incoming.clone();
    if let Some(existing) = by_address {
        row.created_at = existing.created_at;
        match (&existing.creator_public_key, &incoming.creator_public_key) {
            (Some(kept), Some(new)) if kept != new => {
                return Err(RegistryError::Conflict(format!(
                    "address {} was authorized by a different creator",
                    incoming.address
                )));
            }
            (Some(kept), None) => row.creator_public_key = Some(kept.clone()),
            _ => {}
        }
    }
    Ok(row)
}

// ---------------------------------------------------------------------------
// Legacy rows
// ---------------------------------------------------------------------------

/// A row from the identifier-keyed table that predates address keys.
///
/// `address` may be absent on the oldest rows; it is then re-derived from
/// the DNA hash during record migration. The column names of the old table
/// export (`substrate_address`, `anchoring_status`, `keyring_service_name`)
/// are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyBorgRecord {
    pub borg_id: String,
    #[serde(alias = "substrate_address", default)]
    pub address: Option<String>,
    pub dna_hash: String,
    #[serde(alias = "anchoring_status", default = "pending")]
    pub status: BorgStatus,
    #[serde(alias = "keyring_service_name", default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub creator_public_key: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub balances: BTreeMap<Currency, u64>,
}

fn pending() -> BorgStatus {
    BorgStatus::Pending
}

impl LegacyBorgRecord {
    /// Parse a JSON export of the identifier-keyed table: an array of rows.
    pub fn from_json_export(raw: &str) -> RegistryResult<Vec<Self>> {
        serde_json::from_str(raw).map_err(|e| RegistryError::Serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// InMemoryRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    borgs: BTreeMap<String, BorgIdentity>,
    ids: HashMap<String, String>,
    balances: HashMap<(String, Currency), u64>,
}

/// Process-local registry. Used in tests and by embedders without a
/// database.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    tables: RwLock<Tables>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataRegistry for InMemoryRegistry {
    fn upsert(&self, identity: &BorgIdentity) -> RegistryResult<()> {
        let mut tables = self.tables.write();
        let by_identifier = tables
            .ids
            .get(&identity.identifier)
            .and_then(|addr| tables.borgs.get(addr));
        let row = merge_upsert(tables.borgs.get(&identity.address), by_identifier, identity)?;

        tables.ids.insert(row.identifier.clone(), row.address.clone());
        tables.borgs.insert(row.address.clone(), row);
        Ok(())
    }

    fn find_by_identifier(&self, identifier: &str) -> RegistryResult<Option<BorgIdentity>> {
        let tables = self.tables.read();
        Ok(tables
            .ids
            .get(identifier)
            .and_then(|addr| tables.borgs.get(addr))
            .cloned())
    }

    fn find_by_address(&self, address: &str) -> RegistryResult<Option<BorgIdentity>> {
        Ok(self.tables.read().borgs.get(address).cloned())
    }

    fn update_status(&self, address: &str, status: BorgStatus) -> RegistryResult<()> {
        let mut tables = self.tables.write();
        let row = tables
            .borgs
            .get_mut(address)
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))?;
        row.status = status;
        Ok(())
    }

    fn list(&self) -> RegistryResult<Vec<BorgIdentity>> {
        let mut rows: Vec<BorgIdentity> = self.tables.read().borgs.values().cloned().collect();
        rows.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(rows)
    }

    fn init_balances(&self, address: &str) -> RegistryResult<()> {
        let mut tables = self.tables.write();
        for currency in Currency::ALL {
            tables
                .balances
                .entry((address.to_string(), currency))
                .or_insert(0);
        }
        Ok(())
    }

    fn set_balance(&self, address: &str, currency: Currency, amount: u64) -> RegistryResult<()> {
        self.tables
            .write()
            .balances
            .insert((address.to_string(), currency), amount);
        Ok(())
    }

    fn balance(&self, address: &str, currency: Currency) -> RegistryResult<Option<u64>> {
        Ok(self
            .tables
            .read()
            .balances
            .get(&(address.to_string(), currency))
            .copied())
    }
}

/// Registry that is always down. For exercising fallback paths.
#[cfg(test)]
pub(crate) struct UnavailableRegistry;

#[cfg(test)]
impl MetadataRegistry for UnavailableRegistry {
    fn upsert(&self, _: &BorgIdentity) -> RegistryResult<()> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn find_by_identifier(&self, _: &str) -> RegistryResult<Option<BorgIdentity>> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn find_by_address(&self, _: &str) -> RegistryResult<Option<BorgIdentity>> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn update_status(&self, _: &str, _: BorgStatus) -> RegistryResult<()> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn list(&self) -> RegistryResult<Vec<BorgIdentity>> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn init_balances(&self, _: &str) -> RegistryResult<()> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn set_balance(&self, _: &str, _: Currency, _: u64) -> RegistryResult<()> {
        Err(RegistryError::Unavailable("down".into()))
    }
    fn balance(&self, _: &str, _: Currency) -> RegistryResult<Option<u64>> {
        Err(RegistryError::Unavailable("down".into()))
    }
}
