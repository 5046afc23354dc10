//! SQLite-backed discovery store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    DiscoveredDocument, DiscoveredDomain, DiscoveredSource, ScanRun, SourceStatus, StoreStatistics,
};
use super::{DiscoveryStore, SizeFilter};
use crate::error::{Result, ScoutError};

/// SQLite discovery store.
///
/// Thread-safe via an internal `Mutex<Connection>`; every statement runs
/// with the mutex held.
pub struct SqliteDiscoveryStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteDiscoveryStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ScoutError::Lock(e.to_string()))
    }
}

const SOURCE_COLUMNS: &str =
    "domain, path, url, status, pdf_count, error, last_run_id, last_scanned";
const DOCUMENT_COLUMNS: &str = "d.url, d.domain, d.source_path, d.title, d.size_bytes, d.content_type, \
     d.first_run_id, d.last_run_id, d.discovered_at";
const RUN_COLUMNS: &str = "run_id, started_at, completed_at, sources_attempted, pdfs_found, \
     new_pdfs, cancelled, error";

impl DiscoveryStore for SqliteDiscoveryStore {
    fn upsert_domain(&self, domain: &DiscoveredDomain) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO discovered_domains (domain, origin_query, origin_url, hits, first_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(domain) DO UPDATE SET
                 origin_query = excluded.origin_query,
                 origin_url = excluded.origin_url,
                 hits = excluded.hits",
            params![
                domain.domain,
                domain.origin_query,
                domain.origin_url,
                to_i64(domain.hits as u64),
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    fn domain_last_scanned(&self, domain: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let secs: Option<Option<i64>> = conn
            .query_row(
                "SELECT last_scanned FROM discovered_domains WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        Ok(secs.flatten().map(from_epoch))
    }

    fn mark_domain_scanned(&self, domain: &str, pdf_count: u64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE discovered_domains SET pdf_count = ?1, last_scanned = ?2 WHERE domain = ?3",
            params![to_i64(pdf_count), at.timestamp(), domain],
        )?;
        Ok(())
    }

    fn upsert_source(&self, source: &DiscoveredSource) -> Result<()> {
        let conn = self.lock()?;
        write_source(&conn, source)?;
        Ok(())
    }

    fn record_source_outcome(&self, run_id: &str, source: &DiscoveredSource) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        write_source(&tx, source)?;
        tx.execute(
            "INSERT OR REPLACE INTO scan_run_sources
                 (run_id, domain, path, url, status, pdf_count, error, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                source.domain,
                source.path,
                source.url,
                source.status.as_str(),
                to_i64(source.pdf_count),
                source.error,
                source.last_scanned.unwrap_or_else(Utc::now).timestamp()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn record_document(&self, document: &DiscoveredDocument) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO discovered_documents
                 (url, domain, source_path, title, size_bytes, content_type,
                  first_run_id, last_run_id, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document.url,
                document.domain,
                document.source_path,
                document.title,
                document.size_bytes.map(to_i64),
                document.content_type,
                document.first_run_id,
                document.last_run_id,
                document.discovered_at.timestamp()
            ],
        )? == 1;
        if !inserted {
            tx.execute(
                "UPDATE discovered_documents SET
                     size_bytes = COALESCE(?1, size_bytes),
                     content_type = COALESCE(?2, content_type),
                     last_run_id = ?3
                 WHERE url = ?4",
                params![
                    document.size_bytes.map(to_i64),
                    document.content_type,
                    document.last_run_id,
                    document.url
                ],
            )?;
        }
        tx.execute(
            "INSERT OR IGNORE INTO scan_run_documents (run_id, url) VALUES (?1, ?2)",
            params![document.last_run_id, document.url],
        )?;
        tx.commit()?;
        Ok(inserted)
    }

    fn begin_run(&self, run: &ScanRun) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scan_runs (run_id, started_at) VALUES (?1, ?2)",
            params![run.run_id, run.started_at.timestamp()],
        )?;
        Ok(())
    }

    fn finish_run(&self, run: &ScanRun) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE scan_runs SET
                 completed_at = ?1, sources_attempted = ?2, pdfs_found = ?3,
                 new_pdfs = ?4, cancelled = ?5, error = ?6
             WHERE run_id = ?7",
            params![
                run.completed_at.map(|t| t.timestamp()),
                to_i64(run.sources_attempted),
                to_i64(run.pdfs_found),
                to_i64(run.new_pdfs),
                run.cancelled,
                run.error,
                run.run_id
            ],
        )?;
        if rows == 0 {
            return Err(ScoutError::RunNotFound(run.run_id.clone()));
        }
        Ok(())
    }

    fn get_run(&self, run_id: &str) -> Result<Option<ScanRun>> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM scan_runs WHERE run_id = ?1"),
                params![run_id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let conn = self.lock()?;
        recent_runs(&conn, limit)
    }

    fn run_sources(&self, run_id: &str) -> Result<Vec<DiscoveredSource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT domain, path, url, status, pdf_count, error, run_id, scanned_at
             FROM scan_run_sources WHERE run_id = ?1 ORDER BY domain, path",
        )?;
        let sources = stmt
            .query_map(params![run_id], row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn run_documents(&self, run_id: &str, filter: &SizeFilter) -> Result<Vec<DiscoveredDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM discovered_documents d
             JOIN scan_run_documents r ON r.url = d.url
             WHERE r.run_id = ?1 ORDER BY d.domain, d.url"
        ))?;
        let docs = stmt
            .query_map(params![run_id], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs
            .into_iter()
            .filter(|d| filter.matches(d.size_bytes))
            .collect())
    }

    fn list_sources(
        &self,
        domain: Option<&str>,
        status: Option<SourceStatus>,
    ) -> Result<Vec<DiscoveredSource>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SOURCE_COLUMNS} FROM discovered_sources
             WHERE (?1 IS NULL OR domain = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY domain, path"
        ))?;
        let sources = stmt
            .query_map(params![domain, status.map(|s| s.as_str())], row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sources)
    }

    fn list_documents(
        &self,
        domain: Option<&str>,
        filter: &SizeFilter,
    ) -> Result<Vec<DiscoveredDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM discovered_documents d
             WHERE (?1 IS NULL OR d.domain = ?1) ORDER BY d.domain, d.url"
        ))?;
        let docs = stmt
            .query_map(params![domain], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs
            .into_iter()
            .filter(|d| filter.matches(d.size_bytes))
            .collect())
    }

    fn reset_source(&self, domain: &str, path: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE discovered_sources SET status = 'pending', error = NULL
             WHERE domain = ?1 AND path = ?2",
            params![domain, path],
        )?;
        Ok(rows > 0)
    }

    fn statistics(&self, recent: usize) -> Result<StoreStatistics> {
        let conn = self.lock()?;
        let count = |sql: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(to_u64)
        };
        let mut stats = StoreStatistics {
            domains: count("SELECT COUNT(*) FROM discovered_domains")?,
            documents: count("SELECT COUNT(*) FROM discovered_documents")?,
            ..Default::default()
        };

        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM discovered_sources GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (status, n) in rows {
            let n = to_u64(n);
            match status.parse::<SourceStatus>() {
                Ok(SourceStatus::Pending) => stats.pending_sources = n,
                Ok(SourceStatus::Scanning) => stats.scanning_sources = n,
                Ok(SourceStatus::Completed) => stats.completed_sources = n,
                Ok(SourceStatus::Failed) => stats.failed_sources = n,
                Err(e) => tracing::warn!(error = %e, "ignoring unknown source status"),
            }
        }
        drop(stmt);
        stats.recent_runs = recent_runs(&conn, recent)?;
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Statement helpers
// ---------------------------------------------------------------------------

fn write_source(conn: &Connection, source: &DiscoveredSource) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO discovered_sources
             (domain, path, url, status, pdf_count, error, last_run_id, last_scanned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(domain, path) DO UPDATE SET
             url = excluded.url,
             status = excluded.status,
             pdf_count = excluded.pdf_count,
             error = excluded.error,
             last_run_id = excluded.last_run_id,
             last_scanned = COALESCE(excluded.last_scanned, last_scanned)",
        params![
            source.domain,
            source.path,
            source.url,
            source.status.as_str(),
            to_i64(source.pdf_count),
            source.error,
            source.last_run_id,
            source.last_scanned.map(|t| t.timestamp())
        ],
    )
}

fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<ScanRun>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM scan_runs ORDER BY started_at DESC, rowid DESC LIMIT ?1"
    ))?;
    let runs = stmt
        .query_map(params![to_i64(limit as u64)], row_to_run)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(runs)
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn parse_status(idx: usize, s: &str) -> rusqlite::Result<SourceStatus> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(e)),
        )
    })
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiscoveredSource> {
    let status: String = row.get(3)?;
    Ok(DiscoveredSource {
        domain: row.get(0)?,
        path: row.get(1)?,
        url: row.get(2)?,
        status: parse_status(3, &status)?,
        pdf_count: to_u64(row.get(4)?),
        error: row.get(5)?,
        last_run_id: row.get(6)?,
        last_scanned: row.get::<_, Option<i64>>(7)?.map(from_epoch),
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiscoveredDocument> {
    Ok(DiscoveredDocument {
        url: row.get(0)?,
        domain: row.get(1)?,
        source_path: row.get(2)?,
        title: row.get(3)?,
        size_bytes: row.get::<_, Option<i64>>(4)?.map(to_u64),
        content_type: row.get(5)?,
        first_run_id: row.get(6)?,
        last_run_id: row.get(7)?,
        discovered_at: from_epoch(row.get(8)?),
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRun> {
    Ok(ScanRun {
        run_id: row.get(0)?,
        started_at: from_epoch(row.get(1)?),
        completed_at: row.get::<_, Option<i64>>(2)?.map(from_epoch),
        sources_attempted: to_u64(row.get(3)?),
        pdfs_found: to_u64(row.get(4)?),
        new_pdfs: to_u64(row.get(5)?),
        cancelled: row.get(6)?,
        error: row.get(7)?,
    })
}
