//! # CLI Interface
//!
//! Argument structure for the `borglife` operator binary, via `clap`
//! derive. Global options pick the registry, the local fallback directory
//! and logging; subcommands map one-to-one onto `BorgManager` operations.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// BorgLife keystore operator tool.
///
/// Registers borgs from their DNA hash, resolves identifiers to vault
/// service names, and checks that stored key material still matches its
/// derivation.
#[derive(Parser, Debug)]
#[command(
    name = "borglife",
    about = "BorgLife borg identity and keystore tool",
    version,
    propagate_version = true
)]
pub struct BorgCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to a JSON configuration file. Missing keys take defaults.
    #[arg(long, short = 'c', global = true, env = "BORGLIFE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of the sled metadata registry.
    #[arg(
        long,
        short = 'r',
        global = true,
        env = "BORGLIFE_REGISTRY_DIR",
        default_value = ".borglife/registry"
    )]
    pub registry_dir: PathBuf,

    /// Directory for per-identity fallback JSON records. Overrides the
    /// config file.
    #[arg(long, global = true, env = "BORGLIFE_LOCAL_DIR")]
    pub local_dir: Option<PathBuf>,

    /// Log format: "pretty" or "json".
    #[arg(long, global = true, env = "BORGLIFE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "borglife=info,borglife_core=info")]
    pub log_level: String,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Derive a borg's keypair from its DNA hash and register it.
    Register(RegisterArgs),
    /// Print the vault service name an identifier resolves to.
    Resolve(IdentifierArgs),
    /// Load and verify a borg's keypair, then print its public details.
    Show(IdentifierArgs),
    /// Report on a borg's key material and metadata without failing fast.
    Diagnose(DiagnoseArgs),
    /// List registered borgs.
    List,
    /// Set a borg's status (pending, confirmed, failed).
    SetStatus(SetStatusArgs),
    /// Move legacy records and legacy key services onto address keys.
    Migrate(MigrateArgs),
    /// Compute the DNA hash of a file.
    DnaHash(DnaHashArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct IdentifierArgs {
    /// Borg identifier or SS58 address.
    pub identifier: String,
}

#[derive(Parser, Debug)]
pub struct RegisterArgs {
    /// Borg identifier.
    pub identifier: String,

    /// 64-character hex DNA hash.
    #[arg(long)]
    pub dna_hash: String,

    /// Hex Ed25519 public key of the creator authorizing the registration.
    #[arg(long, requires = "creator_signature")]
    pub creator_public_key: Option<String>,

    /// Hex signature over `register_borg:<identifier>:<dna_hash>:<address>`.
    #[arg(long, requires = "creator_public_key")]
    pub creator_signature: Option<String>,
}

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// JSON export (array of rows) of the identifier-keyed borg table to
    /// import before migrating.
    #[arg(long, value_name = "FILE")]
    pub legacy: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DiagnoseArgs {
    /// Borg identifier or SS58 address.
    pub identifier: String,

    /// Emit the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SetStatusArgs {
    /// Borg identifier or SS58 address.
    pub identifier: String,

    /// New status.
    pub status: String,
}

#[derive(Parser, Debug)]
pub struct DnaHashArgs {
    /// File holding the canonical DNA document.
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        BorgCli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommand() {
        let cli = BorgCli::try_parse_from([
            "borglife",
            "register",
            "alice",
            "--dna-hash",
            "ab",
            "--registry-dir",
            "/tmp/reg",
        ])
        .unwrap();
        assert_eq!(cli.global.registry_dir, PathBuf::from("/tmp/reg"));
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.identifier, "alice");
                assert_eq!(args.dna_hash, "ab");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn migrate_takes_a_legacy_export() {
        let cli = BorgCli::try_parse_from(["borglife", "migrate", "--legacy", "rows.json"]).unwrap();
        match cli.command {
            Commands::Migrate(args) => assert_eq!(args.legacy, Some(PathBuf::from("rows.json"))),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = BorgCli::try_parse_from(["borglife", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate(MigrateArgs { legacy: None })));
    }

    #[test]
    fn creator_key_and_signature_come_together() {
        let lone = BorgCli::try_parse_from([
            "borglife",
            "register",
            "alice",
            "--dna-hash",
            "ab",
            "--creator-public-key",
            "cd",
        ]);
        assert!(lone.is_err());

        let cli = BorgCli::try_parse_from([
            "borglife",
            "register",
            "alice",
            "--dna-hash",
            "ab",
            "--creator-public-key",
            "cd",
            "--creator-signature",
            "ef",
        ])
        .unwrap();
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.creator_public_key.as_deref(), Some("cd"));
                assert_eq!(args.creator_signature.as_deref(), Some("ef"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
