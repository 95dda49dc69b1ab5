//! # Borg Manager
//!
//! The entry point most callers want. Owns a credential store, a metadata
//! registry and a [`BorgConfig`], and wires the derivation, registrar,
//! resolver and reconstructor together.
//!
//! ## Creating a borg
//!
//! ```text
//! validate id ── parse DNA hash ── derive keypair ── creator signature?
//!        │
//!        ├─ registrar: private_key, public_key, address  (rollback on failure)
//!        │
//!        └─ registry: upsert row + zero balances
//!              └─ on outage: local fallback file (if configured)
//! ```
//!
//! Keys are written before metadata. If metadata cannot land anywhere, the
//! keys stay in the vault and the registry error is returned; re-running
//! `create_borg` with the same arguments repairs that state.

use serde::Serialize;
use std::path::PathBuf;

use crate::config::BorgConfig;
use crate::crypto::keys::BorgKeypair;
use crate::crypto::ss58;
use crate::error::{BorgError, BorgResult};
use crate::identity::creator::CreatorAuthorization;
use crate::identity::derivation::{derive_keypair, DnaHash};
use crate::identity::reconstruct::KeypairReconstructor;
use crate::identity::record::{validate_identifier, BorgIdentity, BorgStatus, ServiceName};
use crate::identity::resolver::{IdentityResolver, Resolution, ResolutionStrategy};
use crate::storage::balance::{BalanceRecord, Currency};
use crate::storage::local::{LocalFileIndex, LocalRecord};
use crate::storage::registry::{MetadataRegistry, RegistryError};
use crate::transfer::{TransferError, TransferExecutor, TransferOutcome, TransferRequest};
use crate::vault::registrar::CredentialRegistrar;
use crate::vault::store::{KeyField, KeyMaterialStore};

/// Where a new borg's metadata was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MetadataLocation {
    Registry,
    /// The registry was unavailable; metadata went to this fallback file.
    LocalFile(PathBuf),
}

/// Result of [`BorgManager::create_borg`].
#[derive(Debug, Clone)]
pub struct CreatedBorg {
    pub identity: BorgIdentity,
    pub keypair: BorgKeypair,
    pub metadata: MetadataLocation,
}

/// Presence and format of one vault field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldReport {
    pub field: KeyField,
    pub present: bool,
    pub well_formed: bool,
}

/// Health report for one borg. See [`BorgManager::diagnose`].
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub identifier: String,
    pub service_name: Option<String>,
    pub strategy: Option<String>,
    pub registry_address: Option<String>,
    pub fields: Vec<FieldReport>,
    /// Address of the keypair if reconstruction succeeded.
    pub verified_address: Option<String>,
    /// Failures. Empty means the borg is usable.
    pub problems: Vec<String>,
    /// Non-fatal observations (legacy naming, local-only metadata).
    pub notes: Vec<String>,
    pub remediation: Vec<&'static str>,
}

impl Diagnosis {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }

    fn problem(&mut self, msg: impl Into<String>, hint: &'static str) {
        self.problems.push(msg.into());
        if !self.remediation.contains(&hint) {
            self.remediation.push(hint);
        }
    }
}

/// Orchestrates borg creation, loading and bookkeeping.
#[derive(Debug)]
pub struct BorgManager<S, R> {
    store: S,
    registry: R,
    config: BorgConfig,
    local: Option<LocalFileIndex>,
}

impl<S: KeyMaterialStore, R: MetadataRegistry> BorgManager<S, R> {
    pub fn new(store: S, registry: R, config: BorgConfig) -> Self {
        let local = config.local_fallback_dir.clone().map(LocalFileIndex::new);
        Self {
            store,
            registry,
            config,
            local,
        }
    }

    pub fn config(&self) -> &BorgConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn local_index(&self) -> Option<&LocalFileIndex> {
        self.local.as_ref()
    }

    pub fn resolver(&self) -> IdentityResolver<'_, R, S> {
        IdentityResolver::new(&self.registry, &self.store, &self.config, self.local.as_ref())
    }

    pub fn reconstructor(&self) -> KeypairReconstructor<'_, S> {
        KeypairReconstructor::new(&self.store, self.config.ss58_prefix)
    }

    pub fn registrar(&self) -> CredentialRegistrar<&S> {
        CredentialRegistrar::new(&self.store)
    }

    // -- Creation -----------------------------------------------------------

    /// Derive, store and register a borg.
    ///
    /// Idempotent for identical arguments. Rejects, before touching the
    /// vault, an identifier already registered to a different address.
    pub fn create_borg(&self, identifier: &str, dna_hash: &str) -> BorgResult<CreatedBorg> {
        self.create_borg_with_creator(identifier, dna_hash, None)
    }

    /// [`create_borg`](Self::create_borg), authorized by a creator.
    ///
    /// When `creator` is given its signature over
    /// `register_borg:<identifier>:<dna_hash>:<address>` must verify before
    /// anything is written, and its public key is recorded on the row.
    pub fn create_borg_with_creator(
        &self,
        identifier: &str,
        dna_hash: &str,
        creator: Option<&CreatorAuthorization>,
    ) -> BorgResult<CreatedBorg> {
        validate_identifier(identifier)?;
        let dna_hash = DnaHash::parse(dna_hash)?;
        let keypair = derive_keypair(&dna_hash, self.config.ss58_prefix)?;
        if let Some(auth) = creator {
            auth.verify(identifier, dna_hash.as_str(), keypair.address())?;
        }

        match self.registry.find_by_identifier(identifier) {
            Ok(Some(existing)) if existing.address != keypair.address() => {
                return Err(RegistryError::Conflict(format!(
                    "identifier '{identifier}' already maps to {}",
                    existing.address
                ))
                .into());
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(identifier, error = %e, "registry pre-check failed; continuing");
            }
        }

        let mut identity = BorgIdentity::new(
            identifier,
            keypair.address(),
            dna_hash.as_str(),
            &self.config.service_prefix,
        );
        if let Some(auth) = creator {
            identity = identity.with_creator(auth.public_key.to_ascii_lowercase());
        }
        self.registrar()
            .register_keypair(identity.service_name.as_str(), &keypair)?;

        let metadata = self.store_metadata(&identity)?;

        tracing::info!(
            identifier,
            address = keypair.address(),
            dna_hash_prefix = dna_hash.prefix(),
            creator = creator.is_some(),
            metadata = ?metadata,
            "borg created"
        );
        Ok(CreatedBorg {
            identity,
            keypair,
            metadata,
        })
    }

    fn store_metadata(&self, identity: &BorgIdentity) -> BorgResult<MetadataLocation> {
        let result = self
            .registry
            .upsert(identity)
            .and_then(|()| self.registry.init_balances(&identity.address));

        let err = match result {
            Ok(()) => return Ok(MetadataLocation::Registry),
            Err(e @ RegistryError::Conflict(_)) => return Err(e.into()),
            Err(e) => e,
        };

        let Some(index) = &self.local else {
            return Err(err.into());
        };
        match index.write(&LocalRecord::from(identity)) {
            Ok(path) => {
                tracing::warn!(
                    identifier = %identity.identifier,
                    error = %err,
                    path = %path.display(),
                    "registry unavailable; metadata written to local fallback file"
                );
                Ok(MetadataLocation::LocalFile(path))
            }
            Err(local_err) => {
                tracing::warn!(
                    identifier = %identity.identifier,
                    error = %local_err,
                    "local fallback write failed too"
                );
                Err(err.into())
            }
        }
    }

    // -- Loading ------------------------------------------------------------

    /// Resolve `identifier` and return its verified keypair.
    pub fn load_keypair(&self, identifier: &str) -> BorgResult<BorgKeypair> {
        let resolution = self.resolver().resolve_detailed(identifier)?;
        self.reconstructor().reconstruct(
            resolution.service_name.as_str(),
            resolution.expected_address.as_deref(),
        )
    }

    /// The canonical address of an identifier or address.
    pub fn address_of(&self, identifier: &str) -> BorgResult<String> {
        let resolution = self.resolver().resolve_detailed(identifier)?;
        if let Some(address) = resolution.expected_address {
            return Ok(address);
        }
        // Legacy names carry no address; the stored field is the best we have.
        self.store
            .get(resolution.service_name.as_str(), KeyField::Address)?
            .ok_or_else(|| BorgError::IdentityNotFound {
                identifier: identifier.to_string(),
            })
    }

    // -- Bookkeeping --------------------------------------------------------

    pub fn update_status(&self, identifier: &str, status: BorgStatus) -> BorgResult<()> {
        let address = self.address_of(identifier)?;
        self.registry.update_status(&address, status)?;
        tracing::info!(identifier, %address, %status, "borg status updated");
        Ok(())
    }

    /// Record an observed on-chain balance.
    pub fn sync_balance(&self, identifier: &str, currency: Currency, amount: u64) -> BorgResult<()> {
        let address = self.address_of(identifier)?;
        self.registry.set_balance(&address, currency, amount)?;
        tracing::debug!(identifier, %address, %currency, amount, "balance synced");
        Ok(())
    }

    /// Last recorded balance, `None` if no balance row exists.
    pub fn balance(&self, identifier: &str, currency: Currency) -> BorgResult<Option<u64>> {
        let address = self.address_of(identifier)?;
        Ok(self.registry.balance(&address, currency)?)
    }

    /// Every recorded balance row for the borg, one per currency present.
    pub fn balances(&self, identifier: &str) -> BorgResult<Vec<BalanceRecord>> {
        let address = self.address_of(identifier)?;
        let mut rows = Vec::with_capacity(Currency::ALL.len());
        for currency in Currency::ALL {
            if let Some(amount) = self.registry.balance(&address, currency)? {
                rows.push(BalanceRecord {
                    address: address.clone(),
                    currency,
                    amount,
                });
            }
        }
        Ok(rows)
    }

    pub fn list_borgs(&self) -> BorgResult<Vec<BorgIdentity>> {
        Ok(self.registry.list()?)
    }

    // -- Transfers ----------------------------------------------------------

    /// Transfer `amount` of `currency` from one borg to another borg or
    /// address, then record the balances the executor observed.
    pub fn transfer<E: TransferExecutor>(
        &self,
        executor: &E,
        from: &str,
        to: &str,
        amount: u64,
        currency: Currency,
    ) -> BorgResult<TransferOutcome> {
        if amount == 0 {
            return Err(TransferError::ZeroAmount.into());
        }

        let destination = self.destination_address(to)?;
        let sender = self.load_keypair(from)?;
        if sender.address() == destination {
            return Err(TransferError::SelfTransfer {
                address: destination,
            }
            .into());
        }

        let request = TransferRequest {
            sender: &sender,
            destination: &destination,
            amount,
            currency,
        };
        let receipt = executor.execute(&request)?;

        for (address, observed) in [
            (sender.address(), receipt.sender_balance),
            (destination.as_str(), receipt.destination_balance),
        ] {
            if let Err(e) = self.registry.set_balance(address, currency, observed) {
                tracing::warn!(%address, error = %e, "confirmed transfer; balance not recorded");
            }
        }

        tracing::info!(
            from = sender.address(),
            to = %destination,
            %currency,
            amount,
            tx_hash = %receipt.tx_hash,
            "transfer confirmed"
        );
        Ok(TransferOutcome {
            from_address: sender.address().to_string(),
            to_address: destination,
            currency,
            amount,
            receipt,
        })
    }

    fn destination_address(&self, to: &str) -> BorgResult<String> {
        let address = if ss58::decode(to).is_ok() {
            to.to_string()
        } else {
            self.address_of(to)?
        };
        ss58::decode_with_prefix(&address, self.config.ss58_prefix).map_err(|e| {
            TransferError::InvalidDestination {
                address: address.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(address)
    }

    // -- Diagnostics --------------------------------------------------------

    /// Inspect everything known about `identifier` without failing fast.
    pub fn diagnose(&self, identifier: &str) -> Diagnosis {
        let mut report = Diagnosis {
            identifier: identifier.to_string(),
            service_name: None,
            strategy: None,
            registry_address: None,
            fields: Vec::new(),
            verified_address: None,
            problems: Vec::new(),
            notes: Vec::new(),
            remediation: Vec::new(),
        };

        let registry_row = if ss58::is_address_literal(identifier, self.config.ss58_prefix) {
            self.registry.find_by_address(identifier)
        } else {
            self.registry.find_by_identifier(identifier)
        };
        match registry_row {
            Ok(Some(row)) => report.registry_address = Some(row.address),
            Ok(None) => report.notes.push("no registry row".into()),
            Err(e) => {
                let err = BorgError::from(e);
                report.problem(err.to_string(), err.remediation());
            }
        }

        let resolution: Resolution = match self.resolver().resolve_detailed(identifier) {
            Ok(r) => r,
            Err(e) => {
                report.problem(e.to_string(), e.remediation());
                return report;
            }
        };
        report.service_name = Some(resolution.service_name.to_string());
        report.strategy = Some(resolution.strategy.to_string());
        match resolution.strategy {
            ResolutionStrategy::LegacyName => report
                .notes
                .push("key material under legacy service name; run migrate".into()),
            ResolutionStrategy::LocalFile => report
                .notes
                .push("metadata only in local fallback file; re-register when the registry is back".into()),
            _ => {}
        }

        if let (Some(registered), Some(expected)) =
            (&report.registry_address, &resolution.expected_address)
        {
            if registered != expected {
                report.problem(
                    format!("registry address {registered} != resolved address {expected}"),
                    "registry and key material disagree; inspect both before use",
                );
            }
        }

        self.check_fields(&resolution.service_name, &mut report);

        match self.reconstructor().reconstruct(
            resolution.service_name.as_str(),
            resolution.expected_address.as_deref(),
        ) {
            Ok(kp) => report.verified_address = Some(kp.address().to_string()),
            Err(e) => report.problem(e.to_string(), e.remediation()),
        }
        report
    }

    fn check_fields(&self, service_name: &ServiceName, report: &mut Diagnosis) {
        for field in KeyField::REQUIRED {
            match self.store.get(service_name.as_str(), field) {
                Ok(value) => {
                    let well_formed = value.as_deref().is_some_and(|v| field_is_well_formed(field, v));
                    report.fields.push(FieldReport {
                        field,
                        present: value.is_some(),
                        well_formed,
                    });
                }
                Err(e) => {
                    let err = BorgError::from(e);
                    report.problem(format!("{field}: {err}"), err.remediation());
                }
            }
        }
    }
}

fn field_is_well_formed(field: KeyField, value: &str) -> bool {
    let is_hex = |len: usize| value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit());
    match field {
        KeyField::PrivateKey => is_hex(crate::config::PRIVATE_KEY_HEX_LENGTH),
        KeyField::PublicKey => is_hex(crate::config::PUBLIC_KEY_HEX_LENGTH),
        KeyField::Address => ss58::decode(value).is_ok(),
        KeyField::BorgId => !value.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::registry::{InMemoryRegistry, UnavailableRegistry};
    use crate::transfer::TransferReceipt;
    use crate::vault::store::InMemoryKeyStore;

    fn manager() -> BorgManager<InMemoryKeyStore, InMemoryRegistry> {
        BorgManager::new(InMemoryKeyStore::new(), InMemoryRegistry::new(), BorgConfig::default())
    }

    /// Executor that confirms every transfer with fixed balances.
    struct Confirming;

    impl TransferExecutor for Confirming {
        fn execute(&self, request: &TransferRequest<'_>) -> Result<TransferReceipt, TransferError> {
            Ok(TransferReceipt {
                tx_hash: "0xabc".into(),
                block_number: Some(7),
                sender_balance: 1_000 - request.amount,
                destination_balance: request.amount,
            })
        }
    }

    #[test]
    fn create_then_load() {
        let m = manager();
        let created = m.create_borg("alice", &"a".repeat(64)).unwrap();
        assert_eq!(created.metadata, MetadataLocation::Registry);
        assert_eq!(created.identity.status, BorgStatus::Pending);

        let loaded = m.load_keypair("alice").unwrap();
        assert_eq!(loaded, created.keypair);
        assert_eq!(m.load_keypair(created.keypair.address()).unwrap(), loaded);
        assert_eq!(m.balance("alice", Currency::NativeToken).unwrap(), Some(0));
        assert_eq!(m.balance("alice", Currency::StableAsset).unwrap(), Some(0));
    }

    #[test]
    fn create_is_idempotent() {
        let m = manager();
        let a = m.create_borg("alice", &"a".repeat(64)).unwrap();
        let b = m.create_borg("alice", &"a".repeat(64)).unwrap();
        assert_eq!(a.keypair, b.keypair);
        assert_eq!(m.list_borgs().unwrap().len(), 1);
        assert_eq!(m.store().len(), 3);
    }

    #[test]
    fn identifier_rebind_rejected_before_keys_written() {
        let m = manager();
        m.create_borg("alice", &"a".repeat(64)).unwrap();
        let err = m.create_borg("alice", &"b".repeat(64)).unwrap_err();
        assert!(matches!(err, BorgError::Registry(RegistryError::Conflict(_))));
        assert_eq!(m.store().len(), 3);
    }

    #[test]
    fn registry_outage_uses_local_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let config = BorgConfig::default().with_local_fallback_dir(dir.path());
        let m = BorgManager::new(InMemoryKeyStore::new(), UnavailableRegistry, config);

        let created = m.create_borg("borg1", &"c".repeat(64)).unwrap();
        assert!(matches!(created.metadata, MetadataLocation::LocalFile(_)));

        let loaded = m.load_keypair("borg1").unwrap();
        assert_eq!(loaded.address(), created.keypair.address());
    }

    #[test]
    fn path_like_identifier_rejected_before_fallback_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = BorgConfig::default().with_local_fallback_dir(dir.path().join("local"));
        let m = BorgManager::new(InMemoryKeyStore::new(), UnavailableRegistry, config);

        let err = m.create_borg("/../escaped", &"a".repeat(64)).unwrap_err();
        assert!(matches!(err, BorgError::InvalidInput(_)));
        assert!(m.store().is_empty());
        assert!(!dir.path().join("escaped_keystore.enc").exists());
    }

    #[test]
    fn creator_signature_accepted_and_recorded() {
        let m = manager();
        let dna = "a".repeat(64);
        let address = derive_keypair(&DnaHash::parse(&dna).unwrap(), 42).unwrap().address().to_string();
        let creator = BorgKeypair::from_seed(&[5u8; 32], 42).unwrap();
        let auth = CreatorAuthorization::sign(&creator, "alice", &dna, &address);

        let created = m.create_borg_with_creator("alice", &dna, Some(&auth)).unwrap();
        assert_eq!(created.identity.creator_public_key, Some(creator.public_key_hex()));
        let row = m.registry().find_by_identifier("alice").unwrap().unwrap();
        assert_eq!(row.creator_public_key, Some(creator.public_key_hex()));

        // A plain re-run keeps the recorded creator.
        m.create_borg("alice", &dna).unwrap();
        let row = m.registry().find_by_identifier("alice").unwrap().unwrap();
        assert_eq!(row.creator_public_key, Some(creator.public_key_hex()));
    }

    #[test]
    fn bad_creator_signature_rejected_before_keys_written() {
        let m = manager();
        let dna = "a".repeat(64);
        let address = derive_keypair(&DnaHash::parse(&dna).unwrap(), 42).unwrap().address().to_string();
        let creator = BorgKeypair::from_seed(&[5u8; 32], 42).unwrap();
        // Signed for a different identifier.
        let auth = CreatorAuthorization::sign(&creator, "mallory", &dna, &address);

        let err = m.create_borg_with_creator("alice", &dna, Some(&auth)).unwrap_err();
        assert!(matches!(err, BorgError::CreatorUnauthorized { .. }));
        assert!(err.remediation().contains("re-sign"));
        assert!(m.store().is_empty());
        assert!(m.registry().find_by_identifier("alice").unwrap().is_none());
    }

    #[test]
    fn registry_outage_without_fallback_keeps_keys() {
        let m = BorgManager::new(InMemoryKeyStore::new(), UnavailableRegistry, BorgConfig::default());
        let err = m.create_borg("borg1", &"c".repeat(64)).unwrap_err();
        assert!(matches!(err, BorgError::Registry(RegistryError::Unavailable(_))));
        assert_eq!(m.store().len(), 3);
    }

    #[test]
    fn status_and_balances_by_identifier() {
        let m = manager();
        m.create_borg("alice", &"a".repeat(64)).unwrap();
        m.update_status("alice", BorgStatus::Confirmed).unwrap();
        m.sync_balance("alice", Currency::NativeToken, 2_000_000_000_000).unwrap();

        let row = m.registry().find_by_identifier("alice").unwrap().unwrap();
        assert_eq!(row.status, BorgStatus::Confirmed);
        assert_eq!(
            m.balance("alice", Currency::NativeToken).unwrap(),
            Some(2_000_000_000_000)
        );

        let rows = m.balances("alice").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].currency, Currency::NativeToken);
        assert_eq!(rows[0].amount, 2_000_000_000_000);
        assert_eq!(rows[1].amount, 0);
    }

    #[test]
    fn unknown_identifier_is_not_found() {
        let m = manager();
        let err = m.load_keypair("ghost").unwrap_err();
        assert!(matches!(err, BorgError::IdentityNotFound { .. }));
        assert!(err.remediation().contains("setup"));
    }

    #[test]
    fn transfer_records_observed_balances() {
        let m = manager();
        m.create_borg("alice", &"a".repeat(64)).unwrap();
        let bob = m.create_borg("bob", &"b".repeat(64)).unwrap();

        let outcome = m
            .transfer(&Confirming, "alice", "bob", 250, Currency::NativeToken)
            .unwrap();
        assert_eq!(outcome.to_address, bob.keypair.address());
        assert_eq!(m.balance("alice", Currency::NativeToken).unwrap(), Some(750));
        assert_eq!(m.balance("bob", Currency::NativeToken).unwrap(), Some(250));
    }

    #[test]
    fn transfer_rejections() {
        let m = manager();
        m.create_borg("alice", &"a".repeat(64)).unwrap();

        let zero = m.transfer(&Confirming, "alice", "alice", 0, Currency::NativeToken);
        assert!(matches!(zero, Err(BorgError::Transfer(TransferError::ZeroAmount))));

        let own = m.transfer(&Confirming, "alice", "alice", 1, Currency::NativeToken);
        assert!(matches!(own, Err(BorgError::Transfer(TransferError::SelfTransfer { .. }))));

        let nowhere = m.transfer(&Confirming, "alice", "ghost", 1, Currency::NativeToken);
        assert!(matches!(nowhere, Err(BorgError::IdentityNotFound { .. })));
    }

    #[test]
    fn diagnose_healthy_and_tampered() {
        let m = manager();
        let created = m.create_borg("alice", &"a".repeat(64)).unwrap();
        let healthy = m.diagnose("alice");
        assert!(healthy.is_healthy(), "{:?}", healthy.problems);
        assert_eq!(healthy.verified_address.as_deref(), Some(created.keypair.address()));
        assert!(healthy.fields.iter().all(|f| f.present && f.well_formed));

        let other = derive_keypair(&DnaHash::parse(&"d".repeat(64)).unwrap(), 42).unwrap();
        m.store()
            .set(created.identity.service_name.as_str(), KeyField::PublicKey, &other.public_key_hex())
            .unwrap();
        let broken = m.diagnose("alice");
        assert!(!broken.is_healthy());
        assert!(broken.remediation.iter().any(|r| r.contains("tampering")));
    }

    #[test]
    fn diagnose_missing_borg() {
        let report = manager().diagnose("ghost");
        assert!(!report.is_healthy());
        assert!(report.service_name.is_none());
        assert!(report.remediation.iter().any(|r| r.contains("setup")));
    }
}
