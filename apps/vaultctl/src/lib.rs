//! # Vault Control
//!
//! Host-side tool around [`wmp_vault`]: wires the file key store, the catalog and the
//! logger from configuration and exposes the catalog operations as subcommands.

pub mod cli;
pub mod commands;
pub mod config;

use crate::cli::{Cli, VaultCommand};
use crate::config::VaultctlConfig;
use anyhow::{Context, Result};
use std::io::{self, Write};
use wmp_vault::keystores::FileKeyStore;
use wmp_vault::{KeyManager, VaultCatalog};

/// Opens the file key store and the catalog described by `cfg`.
///
/// # Errors
/// Fails when the master secret is missing or either store cannot be opened.
pub async fn open_catalog(cfg: &VaultctlConfig, remove_source: bool) -> Result<VaultCatalog> {
    let store = FileKeyStore::builder(&cfg.keystore.root)
        .master_secret(cfg.secret()?, &cfg.keystore.salt)?
        .open()
        .context("Failed to open key store")?;

    let catalog = VaultCatalog::builder()
        .root(&cfg.vault.root)
        .keys(KeyManager::new(store))
        .chunk_size(cfg.vault.chunk_size)
        .remove_source(cfg.vault.remove_source || remove_source)
        .connect()
        .await
        .context("Failed to open vault catalog")?;

    Ok(catalog)
}

/// Executes one parsed command against the configured vault.
///
/// # Errors
/// Returns the failure of the command, with context.
pub async fn run(cli: Cli, cfg: &VaultctlConfig) -> Result<()> {
    let remove_source = matches!(cli.command, VaultCommand::Add { remove_source: true, .. });
    let catalog = open_catalog(cfg, remove_source).await?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        VaultCommand::Add { file, .. } => {
            commands::add(&catalog, &file, &mut stdout).await?;
        },
        VaultCommand::List {} => {
            if commands::list(&catalog, &mut stdout)? == 0 {
                writeln!(stdout, "Vault is empty")?;
            }
        },
        VaultCommand::Play { id, offset, length, out } => {
            drop(stdout);
            match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    commands::play(&catalog, &id, offset, length, io::BufWriter::new(file)).await?;
                },
                None => {
                    commands::play(&catalog, &id, offset, length, io::stdout()).await?;
                },
            }
        },
        VaultCommand::Verify { id } => {
            commands::verify(&catalog, &id, &mut stdout).await?;
        },
        VaultCommand::Remove { id } => {
            commands::remove(&catalog, &id, &mut stdout).await?;
        },
    }

    Ok(())
}
