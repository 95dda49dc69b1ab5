//! # Identity Resolver
//!
//! Turns whatever the caller has (an address, a borg identifier, a name
//! from before the address migration) into the vault service name that
//! holds the key material.
//!
//! ## Strategy order
//!
//! ```text
//! 1. AddressLiteral  48 chars, leading '5'   -> <prefix>-address-<id>
//! 2. Registry        select by identifier    -> <prefix>-address-<row.address>
//! 3. LocalFile       .<id>_keystore.enc      -> address name, or recorded name
//! 4. LegacyName      (probe: private_key?)   -> <prefix>-borg-<id>
//! 5. IdentityNotFound
//! ```
//!
//! Every call walks the list from the top. Nothing is cached, so a borg that
//! was missing a second ago resolves as soon as it is registered. Failures
//! of the registry or a local file are logged and the next strategy runs.

use std::fmt;

use crate::config::BorgConfig;
use crate::crypto::ss58;
use crate::error::{BorgError, BorgResult};
use crate::identity::record::ServiceName;
use crate::storage::local::{LocalFileIndex, LocalIndexError};
use crate::storage::registry::MetadataRegistry;
use crate::vault::store::{KeyField, KeyMaterialStore};

/// One step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    AddressLiteral,
    Registry,
    LocalFile,
    LegacyName,
}

impl ResolutionStrategy {
    /// Full chain in evaluation order.
    pub const ORDER: [ResolutionStrategy; 4] = [
        ResolutionStrategy::AddressLiteral,
        ResolutionStrategy::Registry,
        ResolutionStrategy::LocalFile,
        ResolutionStrategy::LegacyName,
    ];
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolutionStrategy::AddressLiteral => "address-literal",
            ResolutionStrategy::Registry => "registry",
            ResolutionStrategy::LocalFile => "local-file",
            ResolutionStrategy::LegacyName => "legacy-name",
        })
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub service_name: ServiceName,
    pub strategy: ResolutionStrategy,
    /// The address the key material must derive to, when the strategy
    /// learned one. Pass it to the reconstructor.
    pub expected_address: Option<String>,
}

/// Resolves identifiers against a registry, a store and optional local
/// fallback files.
#[derive(Debug)]
pub struct IdentityResolver<'a, R, S> {
    registry: &'a R,
    store: &'a S,
    config: &'a BorgConfig,
    local: Option<&'a LocalFileIndex>,
    strategies: Vec<ResolutionStrategy>,
}

impl<'a, R: MetadataRegistry, S: KeyMaterialStore> IdentityResolver<'a, R, S> {
    /// Build a resolver with the chain implied by `config`.
    ///
    /// `LegacyName` is dropped when legacy fallback is disabled, and
    /// `LocalFile` when no index is given.
    pub fn new(
        registry: &'a R,
        store: &'a S,
        config: &'a BorgConfig,
        local: Option<&'a LocalFileIndex>,
    ) -> Self {
        let strategies = ResolutionStrategy::ORDER
            .into_iter()
            .filter(|s| match s {
                ResolutionStrategy::LocalFile => local.is_some(),
                ResolutionStrategy::LegacyName => config.legacy_fallback,
                _ => true,
            })
            .collect();
        Self {
            registry,
            store,
            config,
            local,
            strategies,
        }
    }

    /// Replace the strategy chain. Order is preserved as given.
    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = ResolutionStrategy>) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    pub fn strategies(&self) -> &[ResolutionStrategy] {
        &self.strategies
    }

    /// Resolve to a service name.
    pub fn resolve(&self, identifier: &str) -> BorgResult<ServiceName> {
        self.resolve_detailed(identifier).map(|r| r.service_name)
    }

    /// Resolve, reporting which strategy matched and the expected address.
    pub fn resolve_detailed(&self, identifier: &str) -> BorgResult<Resolution> {
        if identifier.trim().is_empty() {
            return Err(BorgError::InvalidInput("identifier is empty".into()));
        }

        for strategy in &self.strategies {
            if let Some(resolution) = self.try_strategy(*strategy, identifier) {
                tracing::debug!(
                    identifier,
                    strategy = %resolution.strategy,
                    service_name = %resolution.service_name,
                    "identity resolved"
                );
                return Ok(resolution);
            }
        }

        tracing::debug!(identifier, "identity not found by any strategy");
        Err(BorgError::IdentityNotFound {
            identifier: identifier.to_string(),
        })
    }

    /// Reverse lookup: the identifier registered for `address`.
    pub fn identifier_for(&self, address: &str) -> BorgResult<Option<String>> {
        Ok(self
            .registry
            .find_by_address(address)?
            .map(|row| row.identifier))
    }

    fn try_strategy(&self, strategy: ResolutionStrategy, identifier: &str) -> Option<Resolution> {
        let prefix = self.config.service_prefix.as_str();
        match strategy {
            ResolutionStrategy::AddressLiteral => {
                if !ss58::is_address_literal(identifier, self.config.ss58_prefix) {
                    return None;
                }
                Some(Resolution {
                    service_name: ServiceName::for_address(prefix, identifier),
                    strategy,
                    expected_address: Some(identifier.to_string()),
                })
            }

            ResolutionStrategy::Registry => match self.registry.find_by_identifier(identifier) {
                Ok(Some(row)) => Some(Resolution {
                    service_name: ServiceName::for_address(prefix, &row.address),
                    strategy,
                    expected_address: Some(row.address),
                }),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(identifier, error = %e, "registry lookup failed; trying next strategy");
                    None
                }
            },

            ResolutionStrategy::LocalFile => {
                let index = self.local?;
                match index.read(identifier) {
                    Ok(Some(record)) => {
                        if let Some(address) = record.address {
                            Some(Resolution {
                                service_name: ServiceName::for_address(prefix, &address),
                                strategy,
                                expected_address: Some(address),
                            })
                        } else {
                            record.service_name.map(|name| Resolution {
                                service_name: ServiceName::from_raw(name),
                                strategy,
                                expected_address: None,
                            })
                        }
                    }
                    Ok(None) | Err(LocalIndexError::UnsafeIdentifier(_)) => None,
                    Err(e) => {
                        tracing::warn!(identifier, error = %e, "local fallback unreadable; trying next strategy");
                        None
                    }
                }
            }

            ResolutionStrategy::LegacyName => {
                let service_name = ServiceName::for_legacy_id(prefix, identifier);
                if self.config.probe_legacy_keys {
                    match self.store.get(service_name.as_str(), KeyField::PrivateKey) {
                        Ok(Some(_)) => {}
                        Ok(None) => return None,
                        Err(e) => {
                            tracing::warn!(
                                service_name = %service_name,
                                error = %e,
                                "legacy key probe failed"
                            );
                            return None;
                        }
                    }
                }
                Some(Resolution {
                    service_name,
                    strategy,
                    expected_address: None,
                })
            }
        }
    }
}
