// packages/engine/src/recording/schema.rs
//! Persisted row shapes and the SQL that creates and fills them
//!
//! One store holds two tables. Every row carries the rank of the process that
//! wrote it so stores from several ranks can be merged offline.

use serde::{Deserialize, Serialize};

/// Placeholder stored when the runtime hands over no name
pub const NULL_NAME: &str = "<null name>";

/// Kind tag for parallel regions (parallel_for and friends)
pub const KIND_PARFOR: &str = "PARALLEL_FOR";

/// Kind tag for pushed/popped profile regions
pub const KIND_REGION: &str = "REGION";

/// Kind tag for fences
pub const KIND_FENCE: &str = "FENCE";

/// Kind tag for deep copies
pub const KIND_DEEPCOPY: &str = "DEEPCOPY";

/// Kind tag for allocations
pub const KIND_ALLOCATE: &str = "ALLOCATE";

/// Kind tag for deallocations
pub const KIND_DEALLOCATE: &str = "DEALLOCATE";

/// Kind tag for generic one-shot markers
pub const KIND_EVENT: &str = "EVENT";

/// Kind tag qualified by a device index, e.g. `FENCE[1]`
pub fn device_kind(kind: &str, device_index: u32) -> String {
    format!("{}[{}]", kind, device_index)
}

/// A completed duration on one rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub rank: i64,
    pub name: String,
    pub kind: String,
    
    /// Seconds since the recorder epoch
    pub start: f64,
    
    /// Seconds since the recorder epoch
    pub stop: f64,
}

impl SpanRecord {
    pub const CREATE_TABLE_SQL: &'static str = "CREATE TABLE IF NOT EXISTS Spans(\
        ID INTEGER PRIMARY KEY AUTOINCREMENT,\
        Rank INTEGER NOT NULL,\
        Name TEXT NOT NULL,\
        Kind TEXT NOT NULL,\
        Start REAL NOT NULL,\
        Stop REAL NOT NULL);";
    
    pub const INSERT_SQL: &'static str =
        "INSERT INTO Spans (Rank, Name, Kind, Start, Stop) VALUES (?1, ?2, ?3, ?4, ?5);";
    
    pub const SCAN_SQL: &'static str = "SELECT ID, Rank, Name, Kind, Start, Stop FROM Spans ORDER BY ID;";
    
    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }
}

/// An instantaneous occurrence on one rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub rank: i64,
    pub name: String,
    pub kind: String,
    
    /// Seconds since the recorder epoch
    pub time: f64,
}

impl EventRecord {
    pub const CREATE_TABLE_SQL: &'static str = "CREATE TABLE IF NOT EXISTS Events(\
        ID INTEGER PRIMARY KEY AUTOINCREMENT,\
        Rank INTEGER NOT NULL,\
        Name TEXT NOT NULL,\
        Kind TEXT NOT NULL,\
        Time REAL NOT NULL);";
    
    pub const INSERT_SQL: &'static str =
        "INSERT INTO Events (Rank, Name, Kind, Time) VALUES (?1, ?2, ?3, ?4);";
    
    pub const SCAN_SQL: &'static str = "SELECT ID, Rank, Name, Kind, Time FROM Events ORDER BY ID;";
}
