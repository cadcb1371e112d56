use std::path::{Path, PathBuf};

use anyhow::Context;
use snapstore::SnapshotStore;

const APP_DIR: &str = "trendtato";
const DB_FILE: &str = "trending.db";

/// `<data_dir>/trendtato/trending.db`, falling back to the working directory
/// when the platform has no data directory.
pub(crate) fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DB_FILE)
}

pub(crate) fn open(path: &Path) -> anyhow::Result<SnapshotStore> {
    SnapshotStore::open(path)
        .with_context(|| format!("failed to open snapshot store at {}", path.display()))
}
