//! Subcommand handlers. Each writes its report to the given writer so the binary can
//! print to stdout and tests can capture the output.

use anyhow::{Context, Result, anyhow};
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};
use wmp_vault::{CancelFlag, ReadOutcome, VaultCatalog, VaultEntry, VaultSource};

const COPY_BUF_LEN: usize = 64 * 1024;

/// Encrypts `file` into the vault; Ctrl-C cancels at the next chunk boundary.
pub async fn add(catalog: &VaultCatalog, file: &Path, out: &mut impl Write) -> Result<VaultEntry> {
    let cancel = CancelFlag::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling move");
                cancel.cancel();
            }
        }
    });

    let result = catalog.move_into_vault_with_cancel(file, cancel).await;
    watcher.abort();

    let entry = result.with_context(|| format!("Failed to move {} into the vault", file.display()))?;
    writeln!(out, "{}  {}  {} bytes", entry.id, entry.original_name, entry.size)?;
    Ok(entry)
}

pub fn list(catalog: &VaultCatalog, out: &mut impl Write) -> Result<usize> {
    let entries = catalog.entries();
    for entry in &entries {
        writeln!(
            out,
            "{}  {:>12}  {}  {}  {}",
            entry.id,
            entry.size,
            entry.added_at.format("%Y-%m-%d %H:%M:%S"),
            if entry.is_video { "video" } else { "file" },
            entry.original_name,
        )?;
    }
    Ok(entries.len())
}

/// Decrypts `[offset, offset + length)` of entry `id` into `out` and returns the number
/// of bytes written.
pub async fn play<W>(
    catalog: &VaultCatalog,
    id: &str,
    offset: u64,
    length: Option<u64>,
    out: W,
) -> Result<u64>
where
    W: Write + Send + 'static,
{
    let entry = find(catalog, id)?;
    let mut source = catalog.open_for_playback(&entry).await?;

    let written = tokio::task::spawn_blocking(move || {
        let mut out = out;
        copy_range(&mut source, offset, length, &mut out)
    })
    .await
    .context("Playback task failed")??;

    info!(id, offset, written, "Played vault entry");
    Ok(written)
}

/// Reads the whole entry so the tag is checked. Fails on tampering or a wrong key.
pub async fn verify(catalog: &VaultCatalog, id: &str, out: &mut impl Write) -> Result<u64> {
    let entry = find(catalog, id)?;
    let mut source = catalog.open_for_playback(&entry).await?;

    let checked = tokio::task::spawn_blocking(move || copy_range(&mut source, 0, None, &mut io::sink()))
        .await
        .context("Verification task failed")?
        .with_context(|| format!("Entry {} failed verification", entry.id))?;

    writeln!(out, "{}  ok  {checked} bytes authenticated", entry.id)?;
    Ok(checked)
}

pub async fn remove(catalog: &VaultCatalog, id: &str, out: &mut impl Write) -> Result<()> {
    let entry = find(catalog, id)?;
    catalog.remove(&entry).await?;
    writeln!(out, "{}  removed", entry.id)?;
    Ok(())
}

/// Opens `source` at `offset` and copies the session to `out`.
///
/// # Errors
/// Propagates [`wmp_vault::VaultError`] from the session, including an authentication failure
/// on the final read of a full session, and write errors from `out`.
pub fn copy_range(
    source: &mut VaultSource,
    offset: u64,
    length: Option<u64>,
    out: &mut impl Write,
) -> Result<u64> {
    source.open(offset, length)?;

    let mut buf = vec![0u8; COPY_BUF_LEN];
    let mut written = 0u64;
    while let ReadOutcome::Data(n) = source.read(&mut buf)? {
        out.write_all(&buf[..n])?;
        written += n as u64;
    }
    out.flush()?;
    source.close();
    Ok(written)
}

fn find(catalog: &VaultCatalog, id: &str) -> Result<VaultEntry> {
    catalog.entry(id).ok_or_else(|| anyhow!("No vault entry with id {id}"))
}
