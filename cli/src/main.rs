// Copyright (c) 2026 BorgLife Contributors. MIT License.
// See LICENSE for details.

//! # BorgLife Keystore CLI
//!
//! Entry point for the `borglife` binary. Key material goes to the OS
//! credential vault; metadata goes to a sled registry on disk.
//!
//! - `register`   — derive from a DNA hash and store keys plus metadata
//! - `resolve`    — print the vault service name for an identifier
//! - `show`       — load, verify and print a borg's public details
//! - `diagnose`   — full health report, optionally as JSON
//! - `list`       — registered borgs
//! - `set-status` — update a borg's status
//! - `migrate`    — legacy records (optionally imported from a JSON export)
//!                  and services onto address keys
//! - `dna-hash`   — hash a DNA document
//! - `version`    — print build version information

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;

use borglife_core::config::{self, BorgConfig};
use borglife_core::identity::{BorgStatus, CreatorAuthorization, DnaHash};
use borglife_core::manager::{BorgManager, MetadataLocation};
use borglife_core::migration::Migrator;
use borglife_core::storage::{LegacyBorgRecord, SledRegistry};
use borglife_core::vault::OsKeyringStore;
use borglife_core::BorgError;

use cli::{BorgCli, Commands, GlobalArgs};
use logging::LogFormat;

type Manager = BorgManager<OsKeyringStore, SledRegistry>;

fn main() -> Result<()> {
    let cli = BorgCli::parse();
    logging::init_logging(
        &cli.global.log_level,
        LogFormat::from_str_lossy(&cli.global.log_format),
    );

    let result = run(cli);
    if let Err(err) = &result {
        if let Some(borg) = err.downcast_ref::<BorgError>() {
            eprintln!("hint: {}", borg.remediation());
        }
    }
    result
}

fn run(cli: BorgCli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::DnaHash(args) => {
            let content = std::fs::read(&args.file)
                .with_context(|| format!("failed to read DNA file {}", args.file.display()))?;
            println!("{}", DnaHash::of_content(&content));
            Ok(())
        }
        Commands::Register(args) => {
            let manager = open_manager(&cli.global)?;
            let creator = match (args.creator_public_key, args.creator_signature) {
                (Some(key), Some(sig)) => Some(CreatorAuthorization::new(key, sig)),
                _ => None,
            };
            let created = manager
                .create_borg_with_creator(&args.identifier, &args.dna_hash, creator.as_ref())
                .with_context(|| format!("failed to register borg '{}'", args.identifier))?;
            println!("Borg registered.");
            println!("  Identifier   : {}", created.identity.identifier);
            println!("  Address      : {}", created.keypair.address());
            println!("  Public key   : {}", created.keypair.public_key_hex());
            println!("  Service name : {}", created.identity.service_name);
            match created.metadata {
                MetadataLocation::Registry => println!("  Metadata     : registry"),
                MetadataLocation::LocalFile(path) => {
                    println!("  Metadata     : local file {} (registry unavailable)", path.display())
                }
            }
            Ok(())
        }
        Commands::Resolve(args) => {
            let manager = open_manager(&cli.global)?;
            let resolution = manager.resolver().resolve_detailed(&args.identifier)?;
            println!("{}", resolution.service_name);
            tracing::info!(strategy = %resolution.strategy, "resolved");
            Ok(())
        }
        Commands::Show(args) => {
            let manager = open_manager(&cli.global)?;
            show(&manager, &args.identifier)
        }
        Commands::Diagnose(args) => {
            let manager = open_manager(&cli.global)?;
            let report = manager.diagnose(&args.identifier);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Diagnosis for '{}'", report.identifier);
                println!("  Service name : {}", report.service_name.as_deref().unwrap_or("-"));
                println!("  Strategy     : {}", report.strategy.as_deref().unwrap_or("-"));
                println!("  Registry     : {}", report.registry_address.as_deref().unwrap_or("-"));
                println!("  Verified     : {}", report.verified_address.as_deref().unwrap_or("-"));
                for field in &report.fields {
                    println!(
                        "  {:<12} : present={} well_formed={}",
                        field.field.as_str(),
                        field.present,
                        field.well_formed
                    );
                }
                for note in &report.notes {
                    println!("  note: {note}");
                }
                for problem in &report.problems {
                    println!("  problem: {problem}");
                }
                for hint in &report.remediation {
                    println!("  hint: {hint}");
                }
            }
            if !report.is_healthy() {
                anyhow::bail!("borg '{}' is not healthy", args.identifier);
            }
            Ok(())
        }
        Commands::List => {
            let manager = open_manager(&cli.global)?;
            for borg in manager.list_borgs()? {
                println!("{}\t{}\t{}", borg.identifier, borg.address, borg.status);
            }
            Ok(())
        }
        Commands::SetStatus(args) => {
            let manager = open_manager(&cli.global)?;
            let status: BorgStatus = args.status.parse()?;
            manager.update_status(&args.identifier, status)?;
            println!("{} -> {}", args.identifier, status);
            Ok(())
        }
        Commands::Migrate(args) => {
            let manager = open_manager(&cli.global)?;
            if let Some(path) = &args.legacy {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read legacy export {}", path.display()))?;
                let rows = LegacyBorgRecord::from_json_export(&raw)
                    .with_context(|| format!("invalid legacy export {}", path.display()))?;
                manager
                    .registry()
                    .import_legacy_records(&rows)
                    .context("failed to import legacy records")?;
            }
            let migrator = Migrator::new(manager.store(), manager.registry(), manager.config());
            let legacy = manager
                .registry()
                .legacy_records()
                .context("failed to read legacy records")?;
            let records = migrator.migrate_records(&legacy);
            let services = migrator.migrate_services()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "records": records,
                    "services": services,
                }))?
            );
            if !(records.is_clean() && services.is_clean()) {
                anyhow::bail!("migration finished with failures");
            }
            Ok(())
        }
    }
}

/// Load the config file (if any), apply CLI overrides and open the registry.
fn open_manager(global: &GlobalArgs) -> Result<Manager> {
    let mut config = match &global.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            BorgConfig::from_json(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => BorgConfig::default(),
    };
    if let Some(dir) = &global.local_dir {
        config = config.with_local_fallback_dir(dir);
    }

    std::fs::create_dir_all(&global.registry_dir).with_context(|| {
        format!(
            "failed to create registry directory {}",
            global.registry_dir.display()
        )
    })?;
    let registry = SledRegistry::open(&global.registry_dir).with_context(|| {
        format!("failed to open registry at {}", global.registry_dir.display())
    })?;
    tracing::debug!(path = %global.registry_dir.display(), "registry opened");

    Ok(BorgManager::new(OsKeyringStore::new(), registry, config))
}

fn show(manager: &Manager, identifier: &str) -> Result<()> {
    let resolution = manager.resolver().resolve_detailed(identifier)?;
    let keypair = manager.load_keypair(identifier)?;
    println!("Identifier   : {identifier}");
    println!("Address      : {}", keypair.address());
    println!("Public key   : {}", keypair.public_key_hex());
    println!("Service name : {}", resolution.service_name);
    println!("Resolved via : {}", resolution.strategy);
    match manager.balances(identifier) {
        Ok(rows) => {
            for row in rows {
                println!("Balance      : {}", row.currency.format_amount(row.amount));
            }
        }
        Err(e) => tracing::warn!(error = %e, "balance lookup failed"),
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("borglife       {}", env!("CARGO_PKG_VERSION"));
    println!("service prefix {}", config::DEFAULT_SERVICE_PREFIX);
    println!("ss58 prefix    {}", config::SS58_GENERIC_PREFIX);
}
