//! SQLite DDL for the discovery store.

use rusqlite::Connection;

/// Current schema version stamped into `schema_meta`.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL. `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS discovered_domains (
    domain        TEXT PRIMARY KEY,
    origin_query  TEXT NOT NULL,
    origin_url    TEXT NOT NULL,
    hits          INTEGER NOT NULL DEFAULT 0,
    pdf_count     INTEGER NOT NULL DEFAULT 0,
    first_seen    INTEGER NOT NULL,
    last_scanned  INTEGER
);

-- (domain, path) is the stable identity of a source across runs.
CREATE TABLE IF NOT EXISTS discovered_sources (
    domain        TEXT NOT NULL,
    path          TEXT NOT NULL,
    url           TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending',
    pdf_count     INTEGER NOT NULL DEFAULT 0,
    error         TEXT,
    last_run_id   TEXT,
    last_scanned  INTEGER,
    UNIQUE (domain, path)
);

CREATE INDEX IF NOT EXISTS idx_sources_status ON discovered_sources(status);

CREATE TABLE IF NOT EXISTS discovered_documents (
    url            TEXT PRIMARY KEY,
    domain         TEXT NOT NULL,
    source_path    TEXT NOT NULL,
    title          TEXT NOT NULL,
    size_bytes     INTEGER,
    content_type   TEXT,
    first_run_id   TEXT NOT NULL,
    last_run_id    TEXT NOT NULL,
    discovered_at  INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_domain ON discovered_documents(domain);

-- Append-only run history.
CREATE TABLE IF NOT EXISTS scan_runs (
    run_id             TEXT PRIMARY KEY,
    started_at         INTEGER NOT NULL,
    completed_at       INTEGER,
    sources_attempted  INTEGER NOT NULL DEFAULT 0,
    pdfs_found         INTEGER NOT NULL DEFAULT 0,
    new_pdfs           INTEGER NOT NULL DEFAULT 0,
    cancelled          INTEGER NOT NULL DEFAULT 0,
    error              TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON scan_runs(started_at);

-- Terminal source state as recorded by each run.
CREATE TABLE IF NOT EXISTS scan_run_sources (
    run_id     TEXT NOT NULL REFERENCES scan_runs(run_id),
    domain     TEXT NOT NULL,
    path       TEXT NOT NULL,
    url        TEXT NOT NULL,
    status     TEXT NOT NULL,
    pdf_count  INTEGER NOT NULL DEFAULT 0,
    error      TEXT,
    scanned_at INTEGER NOT NULL,
    PRIMARY KEY (run_id, domain, path)
);

-- Documents accepted by each run.
CREATE TABLE IF NOT EXISTS scan_run_documents (
    run_id  TEXT NOT NULL REFERENCES scan_runs(run_id),
    url     TEXT NOT NULL REFERENCES discovered_documents(url),
    PRIMARY KEY (run_id, url)
);
"#;

/// Apply the full schema and seed the version stamp.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the schema version, or `None` if it was never stamped.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn apply_schema_creates_tables() {
        let conn = Connection::open_in_memory().expect("open");
        apply_schema(&conn).expect("apply");
        let tables = table_names(&conn);
        for expected in [
            "discovered_documents",
            "discovered_domains",
            "discovered_sources",
            "scan_run_documents",
            "scan_run_sources",
            "scan_runs",
            "schema_meta",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        apply_schema(&conn).expect("first");
        apply_schema(&conn).expect("second");
        assert_eq!(
            read_schema_version(&conn).expect("version"),
            Some(CURRENT_SCHEMA_VERSION)
        );
    }

    #[test]
    fn source_identity_is_unique() {
        let conn = Connection::open_in_memory().expect("open");
        apply_schema(&conn).expect("apply");
        let insert = "INSERT INTO discovered_sources (domain, path, url) VALUES ('a.com', '/', 'https://a.com/')";
        conn.execute(insert, []).expect("first insert");
        assert!(conn.execute(insert, []).is_err());
    }
}
