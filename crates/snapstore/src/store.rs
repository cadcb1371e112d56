use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, Params, TransactionBehavior, params};
use tracing::debug;

use crate::StoreError;
use crate::record::{SnapshotInfo, TrendingRecord, Window};
use crate::schema::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = "rank, author, repo_name, repo_url, description, language, \
     total_stars, stars_today, trend_window, captured_at";

const UPSERT_SQL: &str = r#"
INSERT INTO trending (
    capture_date, trend_window, author, repo_name, rank, repo_url, description,
    language, total_stars, stars_today, captured_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT (capture_date, trend_window, author, repo_name) DO UPDATE SET
    rank = excluded.rank,
    repo_url = excluded.repo_url,
    description = excluded.description,
    language = excluded.language,
    total_stars = excluded.total_stars,
    stars_today = excluded.stars_today,
    captured_at = excluded.captured_at
"#;

/// SQLite-backed history of trending snapshots.
///
/// Writes go through a single connection guarded by a mutex, one transaction
/// per call. File-backed stores serve reads from a fresh read-only connection
/// so readers run alongside a writer and only ever see committed snapshots.
#[derive(Debug)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
    writer: Mutex<Connection>,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        run_migrations(&conn)?;

        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            path: None,
            writer: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Upserts `records` keyed by `(capture date, window, author, repo_name)`.
    ///
    /// Every `(date, window)` snapshot touched by the batch ends up holding
    /// exactly the batch's repositories: rows left over from an earlier run of
    /// the same snapshot are removed. Nothing is written if any row fails.
    pub fn write(&self, records: &[TrendingRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut snapshots: BTreeMap<(NaiveDate, Window), HashSet<(&str, &str)>> = BTreeMap::new();
        for record in records {
            snapshots
                .entry((record.capture_date(), record.window))
                .or_default()
                .insert((record.author.as_str(), record.repo_name.as_str()));
        }

        let mut conn = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut replaced = 0usize;
        {
            let mut upsert = tx.prepare_cached(UPSERT_SQL)?;
            for record in records {
                upsert.execute(params![
                    record.capture_date().to_string(),
                    record.window.as_str(),
                    record.author,
                    record.repo_name,
                    record.rank,
                    record.repo_url,
                    record.description,
                    record.language,
                    to_sql_int(record.total_stars, "total_stars")?,
                    to_sql_int(record.stars_today, "stars_today")?,
                    format_timestamp(&record.captured_at),
                ])?;
            }

            let mut existing = tx.prepare_cached(
                "SELECT author, repo_name FROM trending WHERE capture_date = ?1 AND trend_window = ?2",
            )?;
            let mut delete = tx.prepare_cached(
                "DELETE FROM trending \
                 WHERE capture_date = ?1 AND trend_window = ?2 AND author = ?3 AND repo_name = ?4",
            )?;
            for ((date, window), keep) in &snapshots {
                let date = date.to_string();
                let rows = existing
                    .query_map(params![date, window.as_str()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                for (author, repo_name) in rows {
                    if !keep.contains(&(author.as_str(), repo_name.as_str())) {
                        delete.execute(params![date, window.as_str(), author, repo_name])?;
                        replaced += 1;
                    }
                }
            }
        }
        tx.commit()?;

        debug!(
            records = records.len(),
            snapshots = snapshots.len(),
            replaced,
            "snapshot written"
        );
        Ok(records.len())
    }

    /// Most recent snapshot of `window`, at most `limit` rows by rank.
    pub fn latest(&self, window: Window, limit: usize) -> Result<Vec<TrendingRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM trending \
             WHERE trend_window = ?1 \
               AND captured_at = (SELECT MAX(captured_at) FROM trending WHERE trend_window = ?1) \
             ORDER BY rank ASC LIMIT ?2"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_reader(|conn| query_records(conn, &sql, params![window.as_str(), limit]))
    }

    /// Snapshots of `window` captured between `start` and `end`, both inclusive.
    pub fn by_date_range(
        &self,
        window: Window,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TrendingRecord>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }
        let Some(after_end) = end.succ_opt() else {
            return Ok(Vec::new());
        };
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM trending \
             WHERE trend_window = ?1 AND captured_at >= ?2 AND captured_at < ?3 \
             ORDER BY captured_at ASC, rank ASC"
        );
        self.with_reader(|conn| {
            query_records(
                conn,
                &sql,
                params![window.as_str(), day_start(start), day_start(after_end)],
            )
        })
    }

    /// All rows reporting `language`, newest snapshot first.
    pub fn by_language(&self, language: &str) -> Result<Vec<TrendingRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM trending WHERE language = ?1 \
             ORDER BY captured_at DESC, trend_window ASC, rank ASC"
        );
        self.with_reader(|conn| query_records(conn, &sql, params![language]))
    }

    /// Every stored appearance of one repository, newest first.
    pub fn history(&self, author: &str, repo_name: &str) -> Result<Vec<TrendingRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM trending WHERE author = ?1 AND repo_name = ?2 \
             ORDER BY captured_at DESC, trend_window ASC"
        );
        self.with_reader(|conn| query_records(conn, &sql, params![author, repo_name]))
    }

    pub fn snapshots(&self, window: Option<Window>) -> Result<Vec<SnapshotInfo>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare(
                "SELECT capture_date, trend_window, MAX(captured_at), COUNT(*) FROM trending \
                 WHERE ?1 IS NULL OR trend_window = ?1 \
                 GROUP BY capture_date, trend_window \
                 ORDER BY capture_date DESC, trend_window ASC",
            )?;
            let rows = stmt
                .query_map(params![window.map(Window::as_str)], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(date, window, captured_at, count)| {
                    Ok(SnapshotInfo {
                        date: parse_date(&date)?,
                        window: parse_window(&window)?,
                        captured_at: parse_timestamp(&captured_at)?,
                        records: usize::try_from(count).map_err(|_| invalid("count", &count))?,
                    })
                })
                .collect()
        })
    }

    fn with_reader<T>(
        &self,
        read: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match &self.path {
            Some(path) => {
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )?;
                conn.busy_timeout(BUSY_TIMEOUT)?;
                read(&conn)
            }
            None => {
                let conn = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
                read(&conn)
            }
        }
    }
}

struct RawRecord {
    rank: i64,
    author: String,
    repo_name: String,
    repo_url: String,
    description: String,
    language: Option<String>,
    total_stars: i64,
    stars_today: i64,
    window: String,
    captured_at: String,
}

impl TryFrom<RawRecord> for TrendingRecord {
    type Error = StoreError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        Ok(TrendingRecord {
            rank: u32::try_from(raw.rank).map_err(|_| invalid("rank", &raw.rank))?,
            author: raw.author,
            repo_name: raw.repo_name,
            repo_url: raw.repo_url,
            description: raw.description,
            language: raw.language,
            total_stars: u64::try_from(raw.total_stars)
                .map_err(|_| invalid("total_stars", &raw.total_stars))?,
            stars_today: u64::try_from(raw.stars_today)
                .map_err(|_| invalid("stars_today", &raw.stars_today))?,
            window: parse_window(&raw.window)?,
            captured_at: parse_timestamp(&raw.captured_at)?,
        })
    }
}

fn query_records<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<TrendingRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, |row| {
            Ok(RawRecord {
                rank: row.get(0)?,
                author: row.get(1)?,
                repo_name: row.get(2)?,
                repo_url: row.get(3)?,
                description: row.get(4)?,
                language: row.get(5)?,
                total_stars: row.get(6)?,
                stars_today: row.get(7)?,
                window: row.get(8)?,
                captured_at: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(TrendingRecord::try_from).collect()
}

/// Fixed-width RFC 3339 so text order matches time order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn day_start(date: NaiveDate) -> String {
    format_timestamp(&date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.to_utc())
        .map_err(|_| invalid("captured_at", &value))
}

fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid("capture_date", &value))
}

fn parse_window(value: &str) -> Result<Window, StoreError> {
    value
        .parse::<Window>()
        .map_err(|_| invalid("trend_window", &value))
}

fn to_sql_int(value: u64, column: &'static str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| invalid(column, &value))
}

fn invalid(column: &'static str, value: &dyn std::fmt::Display) -> StoreError {
    StoreError::InvalidRow {
        column,
        value: value.to_string(),
    }
}
