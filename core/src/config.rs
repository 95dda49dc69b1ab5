//! # Keystore Configuration & Constants
//!
//! Every magic string and length used by the keystore lives here. Service
//! names are persisted in the OS credential vault and in registry rows, so
//! changing a prefix after borgs exist orphans their key material. Treat the
//! prefixes as part of the on-disk format.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Service Names
// ---------------------------------------------------------------------------

/// Default prefix for every keyring service name we create.
pub const DEFAULT_SERVICE_PREFIX: &str = "borglife";

/// Infix for address-keyed services: `<prefix>-address-<ss58>`.
pub const ADDRESS_SERVICE_INFIX: &str = "address";

/// Infix for legacy identifier-keyed services: `<prefix>-borg-<borg_id>`.
/// Records created before the address-primary migration live here.
pub const LEGACY_SERVICE_INFIX: &str = "borg";

// ---------------------------------------------------------------------------
// Key Material
// ---------------------------------------------------------------------------

/// Ed25519 seed length in bytes. The DNA hash decodes to exactly this.
pub const SEED_LENGTH: usize = 32;

/// Public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Stored private key length in bytes: seed followed by the public key.
pub const PRIVATE_KEY_LENGTH: usize = SEED_LENGTH + PUBLIC_KEY_LENGTH;

/// Hex length of a stored private key. Anything else is rejected before we
/// attempt to decode it.
pub const PRIVATE_KEY_HEX_LENGTH: usize = PRIVATE_KEY_LENGTH * 2;

/// Hex length of a stored public key.
pub const PUBLIC_KEY_HEX_LENGTH: usize = PUBLIC_KEY_LENGTH * 2;

/// Hex length of a DNA hash (a 32-byte digest).
pub const DNA_HASH_HEX_LENGTH: usize = 64;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Operation tag of the message a creator signs to authorize registration:
/// `register_borg:<identifier>:<dna_hash>:<address>`.
pub const REGISTRATION_OPERATION: &str = "register_borg";

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// SS58 network prefix for Westend and generic Substrate chains.
pub const SS58_GENERIC_PREFIX: u16 = 42;

/// Encoded length of a prefix-42 SS58 address over a 32-byte key.
pub const SS58_ADDRESS_LENGTH: usize = 48;

/// Leading character of every prefix-42 SS58 address.
pub const SS58_ADDRESS_LEAD: char = '5';

// ---------------------------------------------------------------------------
// Currencies
// ---------------------------------------------------------------------------

/// Ticker of the chain's native token (Westend).
pub const NATIVE_TOKEN_CODE: &str = "WND";

/// Ticker of the stable asset tracked alongside the native token.
pub const STABLE_ASSET_CODE: &str = "USDB";

// ---------------------------------------------------------------------------
// Local fallback files
// ---------------------------------------------------------------------------

/// Legacy per-identity fallback records are named
/// `<LOCAL_RECORD_PREFIX><borg_id><LOCAL_RECORD_SUFFIX>`. The `.enc` suffix
/// is historical; the content is plain JSON.
pub const LOCAL_RECORD_PREFIX: &str = ".";
pub const LOCAL_RECORD_SUFFIX: &str = "_keystore.enc";

/// Message signed and verified by the reconstructor's self-test.
pub const SELF_TEST_MESSAGE: &[u8] = b"BorgLife keypair validation test";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Runtime knobs for the keystore components.
///
/// Everything has a default that matches the production naming scheme, so
/// `BorgConfig::default()` is what most callers want.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorgConfig {
    /// Prefix prepended to every service name.
    pub service_prefix: String,

    /// Whether the resolver may fall back to `<prefix>-borg-<id>` names.
    pub legacy_fallback: bool,

    /// When set, a legacy service name only counts as resolved if the store
    /// actually holds a private key under it.
    pub probe_legacy_keys: bool,

    /// Directory holding legacy per-identity JSON records. `None` disables
    /// both reading and writing them.
    pub local_fallback_dir: Option<PathBuf>,

    /// SS58 network prefix used when deriving addresses.
    pub ss58_prefix: u16,
}

impl Default for BorgConfig {
    fn default() -> Self {
        Self {
            service_prefix: DEFAULT_SERVICE_PREFIX.to_string(),
            legacy_fallback: true,
            probe_legacy_keys: true,
            local_fallback_dir: None,
            ss58_prefix: SS58_GENERIC_PREFIX,
        }
    }
}

impl BorgConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Builder-style setter for the local fallback directory.
    pub fn with_local_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_fallback_dir = Some(dir.into());
        self
    }
}
