// Copyright (c) 2026 BorgLife Contributors. MIT License.
// See LICENSE for details.

//! # BorgLife Keystore — Core Library
//!
//! Identity and key material for BorgLife borgs: autonomous agents that
//! each own a Substrate (Westend) account.
//!
//! A borg is born from a DNA hash. The hash is the Ed25519 seed, so the
//! address is a pure function of the DNA and can always be re-derived and
//! checked. Private keys live in a credential vault; everything else
//! (identifier, status, balances) lives in a metadata registry.
//!
//! ## Architecture
//!
//! - **config** — Constants and runtime knobs. Service prefixes are part of
//!   the on-disk format.
//! - **crypto** — Hashes, SS58 addresses, the keypair value type.
//! - **identity** — Derivation, registry records, resolution, reconstruction.
//! - **vault** — The credential store trait and the atomic registrar.
//! - **storage** — The metadata registry trait, sled backend, local files.
//! - **manager** — Orchestration: create, load, diagnose, transfer.
//! - **migration** — Moving legacy borgs onto address keys.
//! - **transfer** — The hand-off to whatever talks to the chain.
//!
//! ## Quick start
//!
//! ```
//! use borglife_core::config::BorgConfig;
//! use borglife_core::manager::BorgManager;
//! use borglife_core::storage::InMemoryRegistry;
//! use borglife_core::vault::InMemoryKeyStore;
//!
//! let manager = BorgManager::new(
//!     InMemoryKeyStore::new(),
//!     InMemoryRegistry::new(),
//!     BorgConfig::default(),
//! );
//! let created = manager.create_borg("alice", &"a".repeat(64)).unwrap();
//! let loaded = manager.load_keypair("alice").unwrap();
//! assert_eq!(created.keypair.address(), loaded.address());
//! ```
//!
//! ## Ground rules
//!
//! 1. Key material is never logged. Addresses and service names are.
//! 2. Every stored key is verified against its derivation before use.
//! 3. Collaborators are injected. There are no globals.

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod manager;
pub mod migration;
pub mod storage;
pub mod transfer;
pub mod vault;

pub use error::{BorgError, BorgResult};
