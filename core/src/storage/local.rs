//! # Local Fallback Records
//!
//! Before the remote registry existed, each borg's metadata lived in a JSON
//! file next to the process: `<dir>/.<identifier>_keystore.enc`. Deployments
//! that still carry those files (or that lost the registry during creation)
//! read them through [`LocalFileIndex`].
//!
//! Two generations of field names exist on disk. Both are accepted on read;
//! writes use the modern names.
//!
//! | modern       | legacy          |
//! |--------------|-----------------|
//! | `identifier` | `borg_id`       |
//! | `address`    | `ss58_address`  |
//!
//! Despite the `.enc` suffix these files are plain JSON metadata. They
//! never hold key material.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{LOCAL_RECORD_PREFIX, LOCAL_RECORD_SUFFIX};
use crate::identity::record::{is_path_safe, BorgIdentity};

#[derive(Debug, Error)]
pub enum LocalIndexError {
    #[error("identifier '{0}' cannot be used as a file name")]
    UnsafeIdentifier(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed record {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One local fallback record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    #[serde(alias = "borg_id")]
    pub identifier: String,
    #[serde(alias = "ss58_address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dna_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl From<&BorgIdentity> for LocalRecord {
    fn from(identity: &BorgIdentity) -> Self {
        Self {
            identifier: identity.identifier.clone(),
            address: Some(identity.address.clone()),
            dna_hash: Some(identity.dna_hash.clone()),
            service_name: Some(identity.service_name.as_str().to_string()),
        }
    }
}

/// Directory of per-identity fallback files.
#[derive(Debug, Clone)]
pub struct LocalFileIndex {
    dir: PathBuf,
}

impl LocalFileIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `identifier`. Identifiers that would leave
    /// the directory are refused.
    pub fn path_for(&self, identifier: &str) -> Result<PathBuf, LocalIndexError> {
        if identifier.is_empty() || !is_path_safe(identifier) {
            return Err(LocalIndexError::UnsafeIdentifier(identifier.to_string()));
        }
        Ok(self
            .dir
            .join(format!("{LOCAL_RECORD_PREFIX}{identifier}{LOCAL_RECORD_SUFFIX}")))
    }

    /// Read the record for `identifier`. A missing file is `Ok(None)`.
    pub fn read(&self, identifier: &str) -> Result<Option<LocalRecord>, LocalIndexError> {
        let path = self.path_for(identifier)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(LocalIndexError::Io { path, source }),
        };
        let record = serde_json::from_str(&raw).map_err(|source| LocalIndexError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(Some(record))
    }

    /// Write (or overwrite) the record for `record.identifier`.
    pub fn write(&self, record: &LocalRecord) -> Result<PathBuf, LocalIndexError> {
        let path = self.path_for(&record.identifier)?;
        fs::create_dir_all(&self.dir).map_err(|source| LocalIndexError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let json = serde_json::to_string_pretty(record).map_err(|source| LocalIndexError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| LocalIndexError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalFileIndex::new(dir.path());
        assert!(index.read("ghost").unwrap().is_none());
    }

    #[test]
    fn file_name_layout() {
        let index = LocalFileIndex::new("/var/borgs");
        assert_eq!(
            index.path_for("borg1").unwrap(),
            PathBuf::from("/var/borgs/.borg1_keystore.enc")
        );
    }

    #[test]
    fn legacy_field_names_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalFileIndex::new(dir.path());
        fs::write(
            index.path_for("borg1").unwrap(),
            format!(r#"{{"borg_id": "borg1", "ss58_address": "{ADDR}", "extra": 1}}"#),
        )
        .unwrap();

        let record = index.read("borg1").unwrap().unwrap();
        assert_eq!(record.identifier, "borg1");
        assert_eq!(record.address.as_deref(), Some(ADDR));
        assert!(record.service_name.is_none());
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalFileIndex::new(dir.path().join("nested"));
        let identity = BorgIdentity::new("alice", ADDR, "a".repeat(64), "borglife");
        index.write(&LocalRecord::from(&identity)).unwrap();

        let record = index.read("alice").unwrap().unwrap();
        assert_eq!(record.address.as_deref(), Some(ADDR));
        assert_eq!(
            record.service_name.as_deref(),
            Some(identity.service_name.as_str())
        );
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalFileIndex::new(dir.path());
        fs::write(index.path_for("broken").unwrap(), "{not json").unwrap();
        assert!(matches!(
            index.read("broken"),
            Err(LocalIndexError::Json { .. })
        ));
    }

    #[test]
    fn identifiers_cannot_leave_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let index = LocalFileIndex::new(dir.path().join("local"));
        for bad in ["/../../escaped", "../sibling", "a/b", "a\\b", ""] {
            assert!(matches!(
                index.path_for(bad),
                Err(LocalIndexError::UnsafeIdentifier(_))
            ));
            assert!(index.read(bad).is_err());
        }

        let identity = BorgIdentity::new("/../../escaped", ADDR, "a".repeat(64), "borglife");
        assert!(index.write(&LocalRecord::from(&identity)).is_err());
        assert!(!dir.path().join("escaped_keystore.enc").exists());
    }
}
