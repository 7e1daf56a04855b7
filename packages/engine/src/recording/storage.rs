// packages/engine/src/recording/storage.rs
//! Trace storage using SQLite
//!
//! `TraceStore` is the write side: it is opened once per rank, creates the
//! schema, and is then handed to the persistence worker which applies every
//! insert inside one long-lived `BEGIN IMMEDIATE` transaction. `StoreReader` is
//! the read-only side used by the offline exporter.

use crate::recording::schema::{EventRecord, SpanRecord};
use crate::utils::errors::{RecorderError, Result};
use rusqlite::{params, Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writable per-rank store
pub struct TraceStore {
    conn: Connection,
    path: PathBuf,
    in_transaction: bool,
    spans_written: u64,
    events_written: u64,
}

impl TraceStore {
    /// Open (or create) the store and make sure both tables exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening trace store {:?}", path);
        
        let mut conn = Connection::open(&path).map_err(|e| {
            RecorderError::StorageFailed(format!("Can't open database {:?}: {}", path, e))
        })?;
        
        let tx = conn.transaction().map_err(|e| {
            RecorderError::StorageFailed(format!("Failed to begin schema transaction: {}", e))
        })?;
        tx.execute_batch(SpanRecord::CREATE_TABLE_SQL)
            .and_then(|_| tx.execute_batch(EventRecord::CREATE_TABLE_SQL))
            .map_err(|e| RecorderError::StorageFailed(format!("Schema creation failed: {}", e)))?;
        tx.commit().map_err(|e| {
            RecorderError::StorageFailed(format!("Failed to commit schema: {}", e))
        })?;
        
        let store = Self {
            conn,
            path,
            in_transaction: false,
            spans_written: 0,
            events_written: 0,
        };
        store.prepare_inserts()?;
        
        Ok(store)
    }
    
    /// Compile both insert statements into the statement cache so the
    /// worker never prepares on the write path
    fn prepare_inserts(&self) -> Result<()> {
        for sql in [SpanRecord::INSERT_SQL, EventRecord::INSERT_SQL] {
            self.conn.prepare_cached(sql).map_err(|e| {
                RecorderError::StorageFailed(format!("Failed to prepare statement: {}", e))
            })?;
        }
        Ok(())
    }
    
    /// Open the long-lived write transaction
    pub fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE").map_err(|e| {
            RecorderError::StorageFailed(format!("begin_transaction: SQL error: {}", e))
        })?;
        self.in_transaction = true;
        debug!("Write transaction opened on {:?}", self.path);
        Ok(())
    }
    
    /// Commit the write transaction
    pub fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT").map_err(|e| {
            RecorderError::StorageFailed(format!("commit_transaction: SQL error: {}", e))
        })?;
        self.in_transaction = false;
        debug!(
            "Committed {} spans and {} events to {:?}",
            self.spans_written, self.events_written, self.path
        );
        Ok(())
    }
    
    /// Insert one span row
    pub fn insert_span(&mut self, span: &SpanRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(SpanRecord::INSERT_SQL).map_err(|e| {
            RecorderError::PersistFailed(format!("Failed to prepare span insert: {}", e))
        })?;
        stmt.execute(params![span.rank, span.name, span.kind, span.start, span.stop])
            .map_err(|e| RecorderError::PersistFailed(format!("Execution failed: {}", e)))?;
        self.spans_written += 1;
        Ok(())
    }
    
    /// Insert one event row
    pub fn insert_event(&mut self, event: &EventRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(EventRecord::INSERT_SQL).map_err(|e| {
            RecorderError::PersistFailed(format!("Failed to prepare event insert: {}", e))
        })?;
        stmt.execute(params![event.rank, event.name, event.kind, event.time])
            .map_err(|e| RecorderError::PersistFailed(format!("Execution failed: {}", e)))?;
        self.events_written += 1;
        Ok(())
    }
    
    /// Finalize cached statements and close the connection
    pub fn close(self) -> Result<()> {
        if self.in_transaction {
            debug!("Closing {:?} with an open transaction; it will be rolled back", self.path);
        }
        self.conn.flush_prepared_statement_cache();
        self.conn.close().map_err(|(_, e)| {
            RecorderError::StorageFailed(format!("Failed to close database: {}", e))
        })?;
        info!("Trace store {:?} closed", self.path);
        Ok(())
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
    
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            spans_written: self.spans_written,
            events_written: self.events_written,
        }
    }
}

/// Rows written through one `TraceStore`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub spans_written: u64,
    pub events_written: u64,
}

/// Read-only view of a persisted store
pub struct StoreReader {
    conn: Connection,
    path: PathBuf,
}

impl StoreReader {
    /// Open an existing store read-only
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| {
                RecorderError::StorageFailed(format!("Can't open database {:?}: {}", path, e))
            })?;
        
        Ok(Self { conn, path })
    }
    
    /// Full scan of the Spans table in row order
    pub fn for_each_span<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(SpanRecord) -> Result<()>,
    {
        self.scan(SpanRecord::SCAN_SQL, |row| {
            Ok(SpanRecord {
                rank: row.get(1)?,
                name: row.get(2)?,
                kind: row.get(3)?,
                start: row.get(4)?,
                stop: row.get(5)?,
            })
        }, &mut f)
    }
    
    /// Full scan of the Events table in row order
    pub fn for_each_event<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(EventRecord) -> Result<()>,
    {
        self.scan(EventRecord::SCAN_SQL, |row| {
            Ok(EventRecord {
                rank: row.get(1)?,
                name: row.get(2)?,
                kind: row.get(3)?,
                time: row.get(4)?,
            })
        }, &mut f)
    }
    
    /// All spans, in row order
    pub fn spans(&self) -> Result<Vec<SpanRecord>> {
        let mut spans = Vec::new();
        self.for_each_span(|span| {
            spans.push(span);
            Ok(())
        })?;
        Ok(spans)
    }
    
    /// All events, in row order
    pub fn events(&self) -> Result<Vec<EventRecord>> {
        let mut events = Vec::new();
        self.for_each_event(|event| {
            events.push(event);
            Ok(())
        })?;
        Ok(events)
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    fn scan<T, D, F>(&self, sql: &str, decode: D, f: &mut F) -> Result<()>
    where
        D: Fn(&Row<'_>) -> rusqlite::Result<T>,
        F: FnMut(T) -> Result<()>,
    {
        let mut stmt = self.conn.prepare(sql).map_err(|e| {
            RecorderError::StorageFailed(format!("Can't exec on {:?}: {}", self.path, e))
        })?;
        let mut rows = stmt.query([]).map_err(|e| {
            RecorderError::StorageFailed(format!("Can't exec on {:?}: {}", self.path, e))
        })?;
        
        while let Some(row) = rows.next().map_err(|e| {
            RecorderError::StorageFailed(format!("Scan of {:?} failed: {}", self.path, e))
        })? {
            let id: i64 = row.get(0).unwrap_or(-1);
            let record = decode(row).map_err(|e| {
                RecorderError::DecodeFailed(format!("{:?} row {}: {}", self.path, id, e))
            })?;
            f(record)?;
        }
        
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    
    fn span(name: &str, start: f64, stop: f64) -> SpanRecord {
        SpanRecord {
            rank: 0,
            name: name.to_string(),
            kind: "REGION".to_string(),
            start,
            stop,
        }
    }
    
    #[test]
    fn test_store_creation() {
        let dir = tempdir().unwrap();
        let store = TraceStore::open(dir.path().join("kts_0.sqlite"));
        assert!(store.is_ok());
        
        let store = store.unwrap();
        assert!(!store.in_transaction());
        assert_eq!(store.stats(), StoreStats::default());
        store.close().unwrap();
    }
    
    #[test]
    fn test_reopen_keeps_existing_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kts_0.sqlite");
        
        let mut store = TraceStore::open(&path).unwrap();
        store.begin().unwrap();
        store.insert_span(&span("first", 0.0, 1.0)).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
        
        // CREATE TABLE IF NOT EXISTS must not clobber the first run
        let mut store = TraceStore::open(&path).unwrap();
        store.begin().unwrap();
        store.insert_span(&span("second", 2.0, 3.0)).unwrap();
        store.commit().unwrap();
        store.close().unwrap();
        
        let reader = StoreReader::open(&path).unwrap();
        let names: Vec<_> = reader.spans().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
    
    #[test]
    fn test_write_read_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kts_1.sqlite");
        
        let mut store = TraceStore::open(&path).unwrap();
        store.begin().unwrap();
        store.insert_span(&span("k", 0.25, 0.5)).unwrap();
        store
            .insert_event(&EventRecord {
                rank: 1,
                name: "a[HostSpace]->b[HostSpace](8)".to_string(),
                kind: "DEEPCOPY".to_string(),
                time: 0.3,
            })
            .unwrap();
        assert_eq!(store.stats().spans_written, 1);
        assert_eq!(store.stats().events_written, 1);
        store.commit().unwrap();
        store.close().unwrap();
        
        let reader = StoreReader::open(&path).unwrap();
        assert_eq!(reader.spans().unwrap(), vec![span("k", 0.25, 0.5)]);
        
        let events = reader.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rank, 1);
        assert_eq!(events[0].time, 0.3);
    }
    
    #[test]
    fn test_uncommitted_rows_are_not_visible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kts_0.sqlite");
        
        let mut store = TraceStore::open(&path).unwrap();
        store.begin().unwrap();
        store.insert_span(&span("lost", 0.0, 1.0)).unwrap();
        store.close().unwrap();
        
        let reader = StoreReader::open(&path).unwrap();
        assert!(reader.spans().unwrap().is_empty());
    }
    
    #[test]
    fn test_reader_missing_file() {
        let dir = tempdir().unwrap();
        let result = StoreReader::open(dir.path().join("missing.sqlite"));
        assert!(matches!(result, Err(RecorderError::StorageFailed(_))));
    }
    
    #[test]
    fn test_malformed_row_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.sqlite");
        
        {
            let conn = Connection::open(&path).unwrap();
            // Same column names, no type constraints, so a text Start slips in
            conn.execute_batch(
                "CREATE TABLE Spans(ID INTEGER PRIMARY KEY AUTOINCREMENT, Rank, Name, Kind, Start, Stop);
                 INSERT INTO Spans (Rank, Name, Kind, Start, Stop) VALUES (0, 'k', 'REGION', 'soon', 1.0);",
            )
            .unwrap();
        }
        
        let reader = StoreReader::open(&path).unwrap();
        let result = reader.spans();
        assert!(matches!(result, Err(RecorderError::DecodeFailed(_))));
    }
}
