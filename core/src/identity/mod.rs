//! # Identity Module
//!
//! Who a borg is and how to get its keys back.
//!
//! 1. **Derivation** turns a DNA hash into an Ed25519 keypair and SS58
//!    address. Pure and deterministic.
//!    A creator may authorize the registration with a signature.
//! 2. **Records** are the registry row and the service names that point
//!    into the credential vault.
//! 3. **Resolution** maps an identifier or address onto a service name,
//!    falling back through legacy naming schemes.
//! 4. **Reconstruction** reads key material and verifies it against
//!    everything it should agree with.

pub mod creator;
pub mod derivation;
pub mod reconstruct;
pub mod record;
pub mod resolver;

pub use creator::{registration_message, CreatorAuthorization};
pub use derivation::{derive_from_dna_hash, derive_from_seed, derive_keypair, DnaHash};
pub use reconstruct::KeypairReconstructor;
pub use record::{validate_identifier, BorgIdentity, BorgStatus, ServiceName};
pub use resolver::{IdentityResolver, Resolution, ResolutionStrategy};
