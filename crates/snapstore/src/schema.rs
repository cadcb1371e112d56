use rusqlite::{Connection, params};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trending (
    capture_date TEXT NOT NULL,
    trend_window TEXT NOT NULL CHECK (trend_window IN ('daily', 'weekly', 'monthly')),
    author TEXT NOT NULL CHECK (author <> ''),
    repo_name TEXT NOT NULL CHECK (repo_name <> ''),
    rank INTEGER NOT NULL CHECK (rank >= 1),
    repo_url TEXT NOT NULL,
    description TEXT NOT NULL,
    language TEXT,
    total_stars INTEGER NOT NULL CHECK (total_stars >= 0),
    stars_today INTEGER NOT NULL CHECK (stars_today >= 0),
    captured_at TEXT NOT NULL,
    PRIMARY KEY (capture_date, trend_window, author, repo_name)
);

CREATE INDEX IF NOT EXISTS idx_trending_window_captured
    ON trending (trend_window, captured_at);
CREATE INDEX IF NOT EXISTS idx_trending_language
    ON trending (language);
CREATE INDEX IF NOT EXISTS idx_trending_repo
    ON trending (author, repo_name);
"#;

pub(crate) fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO store_meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
