//! # Borg Identity Records
//!
//! The registry row that binds a human-chosen identifier to a canonical
//! address and the DNA hash the address was derived from, plus the service
//! name under which the key material lives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ADDRESS_SERVICE_INFIX, LEGACY_SERVICE_INFIX};
use crate::error::{BorgError, BorgResult};

/// Registry column width for identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 100;

// ---------------------------------------------------------------------------
// ServiceName
// ---------------------------------------------------------------------------

/// Lookup key for the credential vault.
///
/// Two generations exist side by side:
///
/// - `<prefix>-address-<ss58>` for everything registered after the
///   address-primary migration;
/// - `<prefix>-borg-<identifier>` for older records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    /// Address-keyed service name.
    pub fn for_address(prefix: &str, address: &str) -> Self {
        Self(format!("{prefix}-{ADDRESS_SERVICE_INFIX}-{address}"))
    }

    /// Legacy identifier-keyed service name.
    pub fn for_legacy_id(prefix: &str, identifier: &str) -> Self {
        Self(format!("{prefix}-{LEGACY_SERVICE_INFIX}-{identifier}"))
    }

    /// Wrap a service name read back from a record.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address embedded in an address-keyed name, if this is one.
    pub fn address(&self, prefix: &str) -> Option<&str> {
        self.0
            .strip_prefix(prefix)?
            .strip_prefix('-')?
            .strip_prefix(ADDRESS_SERVICE_INFIX)?
            .strip_prefix('-')
    }

    /// The identifier embedded in a legacy name, if this is one.
    pub fn legacy_identifier(&self, prefix: &str) -> Option<&str> {
        self.0
            .strip_prefix(prefix)?
            .strip_prefix('-')?
            .strip_prefix(LEGACY_SERVICE_INFIX)?
            .strip_prefix('-')
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// BorgStatus
// ---------------------------------------------------------------------------

/// Anchoring / registration status of a borg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorgStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for BorgStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BorgStatus::Pending => "pending",
            BorgStatus::Confirmed => "confirmed",
            BorgStatus::Failed => "failed",
        })
    }
}

impl std::str::FromStr for BorgStatus {
    type Err = BorgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BorgStatus::Pending),
            "confirmed" => Ok(BorgStatus::Confirmed),
            "failed" => Ok(BorgStatus::Failed),
            other => Err(BorgError::InvalidInput(format!("unknown status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// BorgIdentity
// ---------------------------------------------------------------------------

/// One registered borg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorgIdentity {
    /// Human-chosen label. Immutable once assigned.
    pub identifier: String,
    /// Canonical SS58 address; the primary key.
    pub address: String,
    /// Lowercase 64-hex DNA hash the keypair was derived from.
    pub dna_hash: String,
    pub status: BorgStatus,
    /// Vault service holding the key material.
    pub service_name: ServiceName,
    /// Hex public key of the creator who authorized the registration.
    #[serde(default)]
    pub creator_public_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BorgIdentity {
    /// New identity in `pending` state, keyed by address.
    pub fn new(
        identifier: impl Into<String>,
        address: impl Into<String>,
        dna_hash: impl Into<String>,
        service_prefix: &str,
    ) -> Self {
        let address = address.into();
        Self {
            identifier: identifier.into(),
            service_name: ServiceName::for_address(service_prefix, &address),
            address,
            dna_hash: dna_hash.into(),
            status: BorgStatus::Pending,
            creator_public_key: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_creator(mut self, creator_public_key: impl Into<String>) -> Self {
        self.creator_public_key = Some(creator_public_key.into());
        self
    }
}

/// Reject identifiers that cannot be used as registry keys, service name
/// suffixes or fallback file names: empty, too long, containing
/// whitespace/control characters, path separators or `..`.
pub fn validate_identifier(identifier: &str) -> BorgResult<()> {
    if identifier.is_empty() {
        return Err(BorgError::InvalidInput("identifier is empty".into()));
    }
    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(BorgError::InvalidInput(format!(
            "identifier longer than {MAX_IDENTIFIER_LENGTH} bytes"
        )));
    }
    if identifier.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BorgError::InvalidInput(
            "identifier contains whitespace or control characters".into(),
        ));
    }
    if !is_path_safe(identifier) {
        return Err(BorgError::InvalidInput(
            "identifier contains a path separator or '..'".into(),
        ));
    }
    Ok(())
}

/// True if `identifier` can be embedded in a single file name.
pub(crate) fn is_path_safe(identifier: &str) -> bool {
    !identifier.contains(|c: char| c == '/' || c == '\\') && !identifier.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn service_name_generations() {
        let modern = ServiceName::for_address("borglife", ADDR);
        let legacy = ServiceName::for_legacy_id("borglife", "alice");
        assert_eq!(modern.as_str(), format!("borglife-address-{ADDR}"));
        assert_eq!(legacy.as_str(), "borglife-borg-alice");
        assert_eq!(modern.address("borglife"), Some(ADDR));
        assert_eq!(modern.legacy_identifier("borglife"), None);
        assert_eq!(legacy.legacy_identifier("borglife"), Some("alice"));
        assert_eq!(legacy.address("borglife"), None);
    }

    #[test]
    fn new_identity_is_pending_and_address_keyed() {
        let id = BorgIdentity::new("alice", ADDR, "a".repeat(64), "borglife");
        assert_eq!(id.status, BorgStatus::Pending);
        assert_eq!(id.service_name.address("borglife"), Some(ADDR));
    }

    #[test]
    fn status_parse_and_display() {
        for status in [BorgStatus::Pending, BorgStatus::Confirmed, BorgStatus::Failed] {
            assert_eq!(status.to_string().parse::<BorgStatus>().unwrap(), status);
        }
        assert!("anchored".parse::<BorgStatus>().is_err());
    }

    #[test]
    fn identity_json_shape() {
        let id = BorgIdentity::new("alice", ADDR, "a".repeat(64), "borglife");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["service_name"], format!("borglife-address-{ADDR}"));
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("borg_alpha-01").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("two words").is_err());
        assert!(validate_identifier(&"x".repeat(101)).is_err());
    }

    #[test]
    fn identifier_path_components_rejected() {
        for bad in ["/../../escaped", "a/b", "a\\b", "..", "x..y"] {
            assert!(
                matches!(validate_identifier(bad), Err(BorgError::InvalidInput(_))),
                "{bad} accepted"
            );
        }
        assert!(validate_identifier("borg.v2").is_ok());
    }
}
