use anyhow::ensure;
use snapstore::{SnapshotStore, TrendingRecord, Window};

use super::print_records;

/// Latest snapshot of each requested window, ranked.
pub(super) fn latest_records(
    store: &SnapshotStore,
    windows: &[Window],
    limit: usize,
) -> anyhow::Result<Vec<TrendingRecord>> {
    let windows = if windows.is_empty() {
        &Window::ALL[..]
    } else {
        windows
    };
    let mut records = Vec::new();
    for &window in windows {
        records.extend(store.latest(window, limit)?);
    }
    Ok(records)
}

pub(crate) fn cmd_show(
    store: &SnapshotStore,
    windows: &[Window],
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    ensure!(limit > 0, "--limit must be at least 1");
    let records = latest_records(store, windows, limit)?;
    if !json {
        ensure!(!records.is_empty(), "No snapshots stored yet; run `trend run` first");
    }
    print_records(&records, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::record;

    fn seeded() -> SnapshotStore {
        let store = SnapshotStore::open_in_memory().unwrap();
        store
            .write(&[
                record(1, "old/one", Window::Daily, "2025-11-18", None),
                record(2, "old/two", Window::Daily, "2025-11-18", None),
            ])
            .unwrap();
        store
            .write(&[
                record(1, "new/one", Window::Daily, "2025-11-19", Some("Rust")),
                record(2, "new/two", Window::Daily, "2025-11-19", None),
                record(3, "new/three", Window::Daily, "2025-11-19", None),
            ])
            .unwrap();
        store
            .write(&[record(1, "week/one", Window::Weekly, "2025-11-19", None)])
            .unwrap();
        store
    }

    #[test]
    fn test_latest_records_per_window() {
        let store = seeded();
        let records = latest_records(&store, &[Window::Daily], 2).unwrap();
        let names: Vec<String> = records.iter().map(|r| r.full_name()).collect();
        assert_eq!(names, vec!["new/one", "new/two"]);
    }

    #[test]
    fn test_latest_records_defaults_to_all_windows() {
        let store = seeded();
        let records = latest_records(&store, &[], 10).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records.last().unwrap().window, Window::Weekly);
    }

    #[test]
    fn test_show_empty_store_is_an_error() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let err = cmd_show(&store, &[], 10, false).unwrap_err();
        assert!(err.to_string().contains("No snapshots stored yet"));
    }

    #[test]
    fn test_show_rejects_zero_limit() {
        let store = seeded();
        assert!(cmd_show(&store, &[], 0, false).is_err());
    }
}
