//! # Embedded Registry
//!
//! A [`MetadataRegistry`] on sled, for deployments without the remote
//! database and for the operator CLI.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                          | Value                       |
//! |----------------|------------------------------|-----------------------------|
//! | `borgs`        | `address` (UTF-8)            | `bincode(BorgIdentity)`     |
//! | `borg_ids`     | `identifier` (UTF-8)         | `address` (UTF-8)           |
//! | `balances`     | `address` ‖ currency tag (1B) | `amount` (8B BE)           |
//! | `legacy_borgs` | `borg_id` (UTF-8)            | `bincode(LegacyBorgRecord)` |
//!
//! `borgs` and `borg_ids` are updated in one sled transaction so the
//! secondary index can never point at a missing row.

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use super::balance::Currency;
use super::registry::{
    merge_upsert, LegacyBorgRecord, MetadataRegistry, RegistryError, RegistryResult,
};
use crate::identity::record::{BorgIdentity, BorgStatus};

/// sled-backed registry. Cheap to clone; clones share the database.
#[derive(Debug, Clone)]
pub struct SledRegistry {
    db: Db,
    borgs: Tree,
    borg_ids: Tree,
    balances: Tree,
    legacy_borgs: Tree,
}

impl SledRegistry {
    /// Open or create a registry at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop.
    pub fn open_temporary() -> RegistryResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> RegistryResult<Self> {
        Ok(Self {
            borgs: db.open_tree("borgs")?,
            borg_ids: db.open_tree("borg_ids")?,
            balances: db.open_tree("balances")?,
            legacy_borgs: db.open_tree("legacy_borgs")?,
            db,
        })
    }

    pub fn flush(&self) -> RegistryResult<()> {
        self.db.flush()?;
        Ok(())
    }

    // -- Legacy rows ------------------------------------------------------

    /// Load rows from an export of the identifier-keyed table into
    /// `legacy_borgs`. Rows already present are overwritten.
    pub fn import_legacy_records(&self, records: &[LegacyBorgRecord]) -> RegistryResult<usize> {
        for record in records {
            self.legacy_borgs
                .insert(record.borg_id.as_bytes(), encode(record)?)?;
        }
        self.flush()?;
        tracing::info!(rows = records.len(), "legacy rows imported");
        Ok(records.len())
    }

    /// Every legacy row, ordered by `borg_id`.
    pub fn legacy_records(&self) -> RegistryResult<Vec<LegacyBorgRecord>> {
        self.legacy_borgs
            .iter()
            .values()
            .map(|value| decode(&value?))
            .collect()
    }

    fn read_row(&self, address: &str) -> RegistryResult<Option<BorgIdentity>> {
        match self.borgs.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn balance_key(address: &str, currency: Currency) -> Vec<u8> {
    let mut key = Vec::with_capacity(address.len() + 1);
    key.extend_from_slice(address.as_bytes());
    key.push(currency.tag());
    key
}

fn encode<T: serde::Serialize>(value: &T) -> RegistryResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| RegistryError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> RegistryResult<T> {
    bincode::deserialize(bytes).map_err(|e| RegistryError::Serialization(e.to_string()))
}

impl MetadataRegistry for SledRegistry {
    fn upsert(&self, identity: &BorgIdentity) -> RegistryResult<()> {
        let result: TransactionResult<(), RegistryError> =
            (&self.borgs, &self.borg_ids).transaction(|(borgs, ids)| {
                let by_address: Option<BorgIdentity> = match borgs.get(identity.address.as_bytes())? {
                    Some(bytes) => Some(decode(&bytes).map_err(ConflictableTransactionError::Abort)?),
                    None => None,
                };
                let by_identifier: Option<BorgIdentity> =
                    match ids.get(identity.identifier.as_bytes())? {
                        Some(addr) => match borgs.get(addr)? {
                            Some(bytes) => {
                                Some(decode(&bytes).map_err(ConflictableTransactionError::Abort)?)
                            }
                            None => None,
                        },
                        None => None,
                    };

                let row = merge_upsert(by_address.as_ref(), by_identifier.as_ref(), identity)
                    .map_err(ConflictableTransactionError::Abort)?;
                let bytes = encode(&row).map_err(ConflictableTransactionError::Abort)?;

                borgs.insert(row.address.as_bytes(), bytes)?;
                ids.insert(row.identifier.as_bytes(), row.address.as_bytes())?;
                Ok(())
            });

        match result {
            Ok(()) => self.flush(),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn find_by_identifier(&self, identifier: &str) -> RegistryResult<Option<BorgIdentity>> {
        match self.borg_ids.get(identifier.as_bytes())? {
            Some(addr) => {
                let address = String::from_utf8(addr.to_vec())
                    .map_err(|e| RegistryError::Serialization(e.to_string()))?;
                self.read_row(&address)
            }
            None => Ok(None),
        }
    }

    fn find_by_address(&self, address: &str) -> RegistryResult<Option<BorgIdentity>> {
        self.read_row(address)
    }

    fn update_status(&self, address: &str, status: BorgStatus) -> RegistryResult<()> {
        let mut row = self
            .read_row(address)?
            .ok_or_else(|| RegistryError::NotFound(address.to_string()))?;
        row.status = status;
        self.borgs.insert(address.as_bytes(), encode(&row)?)?;
        self.flush()
    }

    fn list(&self) -> RegistryResult<Vec<BorgIdentity>> {
        let mut rows = self
            .borgs
            .iter()
            .values()
            .map(|value| decode::<BorgIdentity>(&value?))
            .collect::<RegistryResult<Vec<_>>>()?;
        rows.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(rows)
    }

    fn init_balances(&self, address: &str) -> RegistryResult<()> {
        for currency in Currency::ALL {
            // Only fills empty slots; an existing balance survives re-registration.
            let _ = self.balances.compare_and_swap(
                balance_key(address, currency),
                None as Option<&[u8]>,
                Some(&0u64.to_be_bytes()[..]),
            )?;
        }
        self.flush()
    }

    fn set_balance(&self, address: &str, currency: Currency, amount: u64) -> RegistryResult<()> {
        self.balances
            .insert(balance_key(address, currency), &amount.to_be_bytes()[..])?;
        self.flush()
    }

    fn balance(&self, address: &str, currency: Currency) -> RegistryResult<Option<u64>> {
        match self.balances.get(balance_key(address, currency))? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| RegistryError::Serialization("invalid balance bytes".into()))?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }
}
