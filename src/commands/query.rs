use anyhow::{Context, bail, ensure};
use chrono::NaiveDate;
use snapstore::{SnapshotStore, Window};

use super::{print_json, print_records};

/// Splits `author/name`, accepting a full repository URL as well.
fn parse_repo(arg: &str) -> anyhow::Result<(String, String)> {
    let trimmed = arg.trim().trim_end_matches('/');
    let path = match url::Url::parse(trimmed) {
        Ok(url) => url.path().trim_matches('/').to_string(),
        Err(_) => trimmed.trim_start_matches('/').to_string(),
    };
    match path.split_once('/') {
        Some((author, name)) if !author.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((author.to_string(), name.to_string()))
        }
        _ => bail!("Expected a repository as author/name, got '{}'", arg),
    }
}

fn parse_date(arg: &str, flag: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(arg, "%Y-%m-%d")
        .with_context(|| format!("{flag} must be a date like 2025-01-31, got '{arg}'"))
}

pub(crate) fn cmd_history(store: &SnapshotStore, repo: &str, json: bool) -> anyhow::Result<()> {
    let (author, name) = parse_repo(repo)?;
    let records = store.history(&author, &name)?;
    if !json {
        ensure!(!records.is_empty(), "No history for {}/{}", author, name);
    }
    print_records(&records, json)
}

pub(crate) fn cmd_language(store: &SnapshotStore, language: &str, json: bool) -> anyhow::Result<()> {
    let records = store.by_language(language)?;
    if !json {
        ensure!(!records.is_empty(), "No repositories recorded for language '{}'", language);
    }
    print_records(&records, json)
}

pub(crate) fn cmd_range(
    store: &SnapshotStore,
    window: Window,
    from: &str,
    to: &str,
    json: bool,
) -> anyhow::Result<()> {
    let from = parse_date(from, "--from")?;
    let to = parse_date(to, "--to")?;
    ensure!(from <= to, "--from ({}) is after --to ({})", from, to);

    let records = store.by_date_range(window, from, to)?;
    if !json {
        ensure!(
            !records.is_empty(),
            "No {} snapshots between {} and {}",
            window,
            from,
            to
        );
    }
    print_records(&records, json)
}

pub(crate) fn cmd_snapshots(
    store: &SnapshotStore,
    window: Option<Window>,
    json: bool,
) -> anyhow::Result<()> {
    let snapshots = store.snapshots(window)?;
    if json {
        return print_json(&snapshots);
    }
    ensure!(!snapshots.is_empty(), "No snapshots stored yet; run `trend run` first");
    for snapshot in &snapshots {
        println!(
            "{}  {:<7}  {:>3} repositories  captured {}",
            snapshot.date,
            snapshot.window,
            snapshot.records,
            snapshot.captured_at.format("%H:%M:%S UTC")
        );
    }
    Ok(())
}
