use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use snapstore::{SnapshotStore, TrendingRecord, Window};
use tracing::info;

use super::show::latest_records;

const FILE_STEM: &str = "trending";
const BACKUP_DIR: &str = "backups";

/// Which files `trend export` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ExportFormat {
    Csv,
    Json,
    All,
}

impl ExportFormat {
    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Csv => &["csv"],
            Self::Json => &["json"],
            Self::All => &["csv", "json"],
        }
    }
}

/// Moves an existing `<stem>.<ext>` into `backups/` under a timestamped name.
fn backup_existing(dir: &Path, ext: &str, stamp: &str) -> anyhow::Result<Option<PathBuf>> {
    let current = dir.join(format!("{FILE_STEM}.{ext}"));
    if !current.exists() {
        return Ok(None);
    }
    let backups = dir.join(BACKUP_DIR);
    fs::create_dir_all(&backups)
        .with_context(|| format!("failed to create {}", backups.display()))?;
    let target = backups.join(format!("{FILE_STEM}_{stamp}.{ext}"));
    fs::rename(&current, &target).with_context(|| {
        format!(
            "failed to move {} to {}",
            current.display(),
            target.display()
        )
    })?;
    info!(from = %current.display(), to = %target.display(), "previous export backed up");
    Ok(Some(target))
}

fn write_csv(path: &Path, records: &[TrendingRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(path: &Path, records: &[TrendingRecord]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, records)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Writes the latest snapshot of each window into `dir`, returning the
/// paths written. `now` names the backups of files being replaced.
fn export(
    store: &SnapshotStore,
    windows: &[Window],
    format: ExportFormat,
    dir: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<PathBuf>> {
    let records = latest_records(store, windows, usize::MAX)?;
    ensure!(
        !records.is_empty(),
        "No snapshots stored yet; run `trend run` first"
    );

    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let stamp = now.format("%Y%m%d_%H%M%S").to_string();

    let mut written = Vec::new();
    for &ext in format.extensions() {
        backup_existing(dir, ext, &stamp)?;
        let path = dir.join(format!("{FILE_STEM}.{ext}"));
        let result = match ext {
            "csv" => write_csv(&path, &records),
            _ => write_json(&path, &records),
        };
        result.with_context(|| format!("failed to write {}", path.display()))?;
        info!(records = records.len(), path = %path.display(), "export written");
        written.push(path);
    }
    Ok(written)
}

pub(crate) fn cmd_export(
    store: &SnapshotStore,
    windows: &[Window],
    format: ExportFormat,
    out: &Path,
) -> anyhow::Result<()> {
    for path in export(store, windows, format, out, Utc::now())? {
        println!("{}", path.display());
    }
    Ok(())
}
