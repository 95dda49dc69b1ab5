//! # Storage Module
//!
//! Everything the keystore persists that is not key material.
//!
//! ```text
//! registry.rs — MetadataRegistry trait, upsert rules, in-memory registry
//! db.rs       — sled-backed registry for local deployments
//! local.rs    — per-identity JSON fallback files
//! balance.rs  — currencies and balance rows
//! ```
//!
//! Values inside sled use bincode. JSON is for the fallback files, which
//! predate the registry and must stay readable by hand.

pub mod balance;
pub mod db;
pub mod local;
pub mod registry;

pub use balance::{BalanceRecord, Currency};
pub use db::SledRegistry;
pub use local::{LocalFileIndex, LocalIndexError, LocalRecord};
pub use registry::{InMemoryRegistry, LegacyBorgRecord, MetadataRegistry, RegistryError};
