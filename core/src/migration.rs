//! # Address-Primary Migration
//!
//! Two one-shot procedures that move pre-migration borgs onto address keys.
//! Run them in this order:
//!
//! 1. **Records**: copy identifier-keyed legacy rows into the address-keyed
//!    registry. Rows without an address get one re-derived from their DNA
//!    hash; rows whose address disagrees with their DNA hash are refused.
//! 2. **Services**: copy key material from `<prefix>-borg-<id>` to
//!    `<prefix>-address-<address>`, verifying it first and writing through
//!    the registrar's rollback path. A `borg_id` field is added for reverse
//!    lookup.
//!
//! Both are idempotent. Legacy rows and legacy vault entries are never
//! deleted; the resolver keeps finding them until an operator removes them.

use serde::Serialize;

use crate::config::BorgConfig;
use crate::error::{BorgError, BorgResult};
use crate::identity::derivation::{derive_keypair, DnaHash};
use crate::identity::reconstruct::KeypairReconstructor;
use crate::identity::record::{BorgIdentity, ServiceName};
use crate::storage::registry::{LegacyBorgRecord, MetadataRegistry};
use crate::vault::registrar::CredentialRegistrar;
use crate::vault::store::{KeyField, KeyMaterialStore};

/// Why an item was skipped or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationNote {
    pub identifier: String,
    pub reason: String,
}

/// Tally of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<MigrationNote>,
    pub failed: Vec<MigrationNote>,
}

impl MigrationReport {
    fn skip(&mut self, identifier: &str, reason: impl Into<String>) {
        self.skipped.push(MigrationNote {
            identifier: identifier.to_string(),
            reason: reason.into(),
        });
    }

    fn fail(&mut self, identifier: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(identifier, %reason, "migration failed for item");
        self.failed.push(MigrationNote {
            identifier: identifier.to_string(),
            reason,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of migrating one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMigration {
    Migrated { from: ServiceName, to: ServiceName },
    /// The address-keyed service already holds a private key.
    AlreadyMigrated(ServiceName),
    /// Nothing stored under the legacy name.
    NoLegacyMaterial(ServiceName),
}

/// Runs both migrations against one store and registry.
#[derive(Debug)]
pub struct Migrator<'a, S, R> {
    store: &'a S,
    registry: &'a R,
    config: &'a BorgConfig,
}

impl<'a, S: KeyMaterialStore, R: MetadataRegistry> Migrator<'a, S, R> {
    pub fn new(store: &'a S, registry: &'a R, config: &'a BorgConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    // -- Records ------------------------------------------------------------

    /// Upsert every legacy row into the address-keyed registry.
    pub fn migrate_records(&self, records: &[LegacyBorgRecord]) -> MigrationReport {
        let mut report = MigrationReport::default();
        for record in records {
            self.migrate_record(record, &mut report);
        }
        tracing::info!(
            migrated = report.migrated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "record migration finished"
        );
        report
    }

    fn migrate_record(&self, record: &LegacyBorgRecord, report: &mut MigrationReport) {
        let id = record.borg_id.as_str();
        let dna_hash = match DnaHash::parse(&record.dna_hash) {
            Ok(h) => h,
            Err(e) => return report.fail(id, e.to_string()),
        };
        let derived = match derive_keypair(&dna_hash, self.config.ss58_prefix) {
            Ok(kp) => kp,
            Err(e) => return report.fail(id, e.to_string()),
        };
        let address = match &record.address {
            Some(addr) if addr != derived.address() => {
                return report.fail(id, format!("address {addr} does not derive from DNA hash"));
            }
            _ => derived.address().to_string(),
        };

        match self.registry.find_by_address(&address) {
            Ok(Some(row)) if row.identifier == record.borg_id => {
                return report.skip(id, "already in address-keyed registry");
            }
            Ok(_) => {}
            Err(e) => return report.fail(id, e.to_string()),
        }

        let identity = BorgIdentity {
            identifier: record.borg_id.clone(),
            service_name: ServiceName::for_address(&self.config.service_prefix, &address),
            address: address.clone(),
            dna_hash: dna_hash.to_string(),
            status: record.status,
            creator_public_key: record.creator_public_key.clone(),
            created_at: record.created_at,
        };
        if let Err(e) = self.registry.upsert(&identity) {
            return report.fail(id, e.to_string());
        }

        let balances = self.registry.init_balances(&address).and_then(|()| {
            record
                .balances
                .iter()
                .try_for_each(|(currency, amount)| self.registry.set_balance(&address, *currency, *amount))
        });
        if let Err(e) = balances {
            return report.fail(id, format!("row migrated, balances not: {e}"));
        }

        tracing::info!(identifier = id, %address, "legacy record migrated");
        report.migrated.push(record.borg_id.clone());
    }

    // -- Services -----------------------------------------------------------

    /// Copy one borg's key material to its address-keyed service name.
    ///
    /// The address comes from the registry, so migrate records first.
    pub fn migrate_service(&self, identifier: &str) -> BorgResult<ServiceMigration> {
        let row = self
            .registry
            .find_by_identifier(identifier)?
            .ok_or_else(|| BorgError::IdentityNotFound {
                identifier: identifier.to_string(),
            })?;
        let prefix = self.config.service_prefix.as_str();
        let from = ServiceName::for_legacy_id(prefix, identifier);
        let to = ServiceName::for_address(prefix, &row.address);

        if self.store.get(to.as_str(), KeyField::PrivateKey)?.is_some() {
            tracing::debug!(identifier, service_name = %to, "already migrated");
            return Ok(ServiceMigration::AlreadyMigrated(to));
        }

        let keypair = match KeypairReconstructor::new(self.store, self.config.ss58_prefix)
            .reconstruct(from.as_str(), Some(&row.address))
        {
            Ok(kp) => kp,
            Err(BorgError::KeyMaterialMissing { .. }) => {
                return Ok(ServiceMigration::NoLegacyMaterial(from));
            }
            Err(e) => return Err(e),
        };

        let private_key = keypair.private_key_hex();
        let public_key = keypair.public_key_hex();
        CredentialRegistrar::new(self.store).write_all(
            to.as_str(),
            &[
                (KeyField::PrivateKey, private_key.as_str()),
                (KeyField::PublicKey, public_key.as_str()),
                (KeyField::Address, keypair.address()),
                (KeyField::BorgId, identifier),
            ],
        )?;

        tracing::info!(identifier, from = %from, to = %to, "key material migrated to address service");
        Ok(ServiceMigration::Migrated { from, to })
    }

    /// Migrate the services of every registered borg.
    pub fn migrate_services(&self) -> BorgResult<MigrationReport> {
        let mut report = MigrationReport::default();
        for row in self.registry.list()? {
            let id = row.identifier.as_str();
            match self.migrate_service(id) {
                Ok(ServiceMigration::Migrated { .. }) => report.migrated.push(row.identifier.clone()),
                Ok(ServiceMigration::AlreadyMigrated(_)) => report.skip(id, "address service already populated"),
                Ok(ServiceMigration::NoLegacyMaterial(_)) => report.skip(id, "no legacy key material"),
                Err(e) => report.fail(id, e.to_string()),
            }
        }
        tracing::info!(
            migrated = report.migrated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "service migration finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::derivation::derive_from_dna_hash;
    use crate::storage::balance::Currency;
    use crate::storage::registry::InMemoryRegistry;
    use crate::vault::store::InMemoryKeyStore;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn legacy(id: &str, dna: char, address: Option<String>) -> LegacyBorgRecord {
        let mut balances = BTreeMap::new();
        balances.insert(Currency::NativeToken, 77);
        LegacyBorgRecord {
            borg_id: id.into(),
            address,
            dna_hash: dna.to_string().repeat(64),
            status: crate::identity::record::BorgStatus::Confirmed,
            service_name: Some(format!("borglife-borg-{id}")),
            creator_public_key: None,
            created_at: Utc::now(),
            balances,
        }
    }

    #[test]
    fn records_migrate_with_balances() {
        let (store, registry, config) = (InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default());
        let migrator = Migrator::new(&store, &registry, &config);
        let kp = derive_from_dna_hash(&"a".repeat(64), 42).unwrap();

        let report = migrator.migrate_records(&[legacy("borg1", 'a', None)]);
        assert_eq!(report.migrated, vec!["borg1".to_string()]);

        let row = registry.find_by_identifier("borg1").unwrap().unwrap();
        assert_eq!(row.address, kp.address());
        assert_eq!(registry.balance(kp.address(), Currency::NativeToken).unwrap(), Some(77));
        assert_eq!(registry.balance(kp.address(), Currency::StableAsset).unwrap(), Some(0));

        let again = migrator.migrate_records(&[legacy("borg1", 'a', None)]);
        assert!(again.migrated.is_empty());
        assert_eq!(again.skipped.len(), 1);
    }

    #[test]
    fn mismatched_address_refused() {
        let (store, registry, config) = (InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default());
        let wrong = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        let report = Migrator::new(&store, &registry, &config)
            .migrate_records(&[legacy("borg1", 'a', Some(wrong.address().into())), legacy("bad", 'z', None)]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_clean());
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn service_migration_copies_and_keeps_legacy() {
        let (store, registry, config) = (InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default());
        let kp = derive_from_dna_hash(&"a".repeat(64), 42).unwrap();
        CredentialRegistrar::new(&store)
            .register_keypair("borglife-borg-borg1", &kp)
            .unwrap();
        let migrator = Migrator::new(&store, &registry, &config);
        migrator.migrate_records(&[legacy("borg1", 'a', None)]);

        let outcome = migrator.migrate_service("borg1").unwrap();
        let target = ServiceName::for_address("borglife", kp.address());
        assert!(matches!(outcome, ServiceMigration::Migrated { ref to, .. } if *to == target));
        assert_eq!(
            store.get(target.as_str(), KeyField::BorgId).unwrap().as_deref(),
            Some("borg1")
        );
        assert!(store.get("borglife-borg-borg1", KeyField::PrivateKey).unwrap().is_some());

        let rebuilt = KeypairReconstructor::new(&store, 42)
            .reconstruct(target.as_str(), Some(kp.address()))
            .unwrap();
        assert_eq!(rebuilt, kp);

        assert_eq!(
            migrator.migrate_service("borg1").unwrap(),
            ServiceMigration::AlreadyMigrated(target)
        );
    }

    #[test]
    fn service_migration_report() {
        let (store, registry, config) = (InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default());
        let migrator = Migrator::new(&store, &registry, &config);
        migrator.migrate_records(&[legacy("empty", 'c', None)]);

        let report = migrator.migrate_services().unwrap();
        assert!(report.migrated.is_empty());
        assert_eq!(report.skipped[0].reason, "no legacy key material");
    }

    #[test]
    fn tampered_legacy_material_not_copied() {
        let (store, registry, config) = (InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default());
        let kp = derive_from_dna_hash(&"a".repeat(64), 42).unwrap();
        let other = derive_from_dna_hash(&"b".repeat(64), 42).unwrap();
        CredentialRegistrar::new(&store)
            .register_keypair("borglife-borg-borg1", &other)
            .unwrap();
        let migrator = Migrator::new(&store, &registry, &config);
        migrator.migrate_records(&[legacy("borg1", 'a', None)]);

        let err = migrator.migrate_service("borg1").unwrap_err();
        assert!(matches!(err, BorgError::IntegrityMismatch { .. }));
        let target = ServiceName::for_address("borglife", kp.address());
        assert!(store.fields(target.as_str()).is_empty());
    }
}
