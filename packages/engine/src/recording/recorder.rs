// packages/engine/src/recording/recorder.rs
//! Recorder lifecycle
//!
//! `init` opens the per-rank store, opens the long-lived write transaction,
//! captures the epoch and starts the persistence worker. `finalize` drains the
//! worker, commits and closes the store. Between the two the recorder is the
//! context object every instrumentation call goes through.

use crate::recording::storage::TraceStore;
use crate::recording::tracker::SpanTracker;
use crate::recording::worker::{PersistenceWorker, WorkerStats};
use crate::utils::config::{FailurePolicy, RecorderConfig};
use crate::utils::errors::{RecorderError, Result};
use crate::utils::rank::resolve_rank;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// An active recorder for one rank
pub struct Recorder {
    rank: i64,
    path: PathBuf,
    tracker: SpanTracker,
    worker: Option<PersistenceWorker<TraceStore>>,
}

impl Recorder {
    /// Resolve the rank, derive the store path from the configuration and start recording
    pub fn init(config: &RecorderConfig) -> Result<Self> {
        let rank = resolve_rank(config);
        Self::init_at(config.store_path(rank), rank, config.failure_policy)
    }
    
    /// Start recording into an explicit store path
    pub fn init_at<P: AsRef<Path>>(path: P, rank: i64, policy: FailurePolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("==== kts: init (rank {}) ====", rank);
        
        let mut store = TraceStore::open(&path)?;
        store.begin()?;
        
        let epoch = Instant::now();
        let worker = PersistenceWorker::start(store, policy)?;
        let tracker = SpanTracker::new(rank, epoch, worker.queue());
        
        Ok(Self {
            rank,
            path,
            tracker,
            worker: Some(worker),
        })
    }
    
    /// Instrumentation API for this recorder
    pub fn tracker(&self) -> &SpanTracker {
        &self.tracker
    }
    
    pub fn rank(&self) -> i64 {
        self.rank
    }
    
    pub fn path(&self) -> &Path {
        &self.path
    }
    
    pub fn stats(&self) -> WorkerStats {
        self.worker.as_ref().map(|w| w.stats()).unwrap_or_default()
    }
    
    /// Drain queued records, commit and close the store
    pub fn finalize(mut self) -> Result<RecorderSummary> {
        info!("==== kts: finalize (rank {}) ====", self.rank);
        
        let unmatched = self.tracker.live_spans() + self.tracker.region_depth();
        if unmatched > 0 {
            debug!("{} spans never ended and will not be persisted", unmatched);
            metrics::counter!("kts_spans_unmatched_total").increment(unmatched as u64);
        }
        
        let worker = self.worker.take().ok_or_else(|| {
            RecorderError::WorkerFailed("persistence worker already joined".to_string())
        })?;
        let mut store = worker.join()?;
        store.commit()?;
        let stats = store.stats();
        store.close()?;
        
        let summary = RecorderSummary {
            rank: self.rank,
            path: self.path.clone(),
            spans_persisted: stats.spans_written,
            events_persisted: stats.events_written,
            unmatched_spans: unmatched,
        };
        info!(
            "Recorded {} spans and {} events to {:?}",
            summary.spans_persisted, summary.events_persisted, summary.path
        );
        
        Ok(summary)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            warn!("Recorder for rank {} dropped without finalize; trace discarded", self.rank);
            abandon(self.rank, worker);
        }
    }
}

/// Drain and stop a worker without committing. The store rolls back its open
/// transaction when it is dropped. A persistence failure is logged and returned.
fn abandon(rank: i64, worker: PersistenceWorker<TraceStore>) -> Option<RecorderError> {
    match worker.join() {
        Ok(_store) => None,
        Err(e) => {
            warn!("Persistence for rank {} failed before drop: {}", rank, e);
            Some(e)
        }
    }
}

/// What a finalized recorder wrote
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSummary {
    pub rank: i64,
    pub path: PathBuf,
    pub spans_persisted: u64,
    pub events_persisted: u64,
    
    /// Begun spans and pushed regions that never ended
    pub unmatched_spans: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::schema::SpanRecord;
    use crate::recording::storage::StoreReader;
    use crate::recording::worker::PersistJob;
    use std::collections::HashMap;
    use tempfile::tempdir;
    
    #[test]
    fn test_recorder_creation() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::init_at(dir.path().join("kts_0.sqlite"), 0, FailurePolicy::Halt);
        assert!(recorder.is_ok());
        
        let recorder = recorder.unwrap();
        assert_eq!(recorder.rank(), 0);
        assert_eq!(recorder.stats(), WorkerStats::default());
    }
    
    #[test]
    fn test_init_from_config() {
        let dir = tempdir().unwrap();
        let mut vars = HashMap::new();
        vars.insert(
            "KTS_SQLITE_PREFIX".to_string(),
            format!("{}/trace_", dir.path().display()),
        );
        vars.insert("KTS_RANK".to_string(), "5".to_string());
        let config = RecorderConfig::from_vars(vars)
            .unwrap()
            .with_failure_policy(FailurePolicy::Halt);
        
        let recorder = Recorder::init(&config).unwrap();
        assert_eq!(recorder.rank(), 5);
        assert_eq!(recorder.path(), dir.path().join("trace_5.sqlite"));
        
        let summary = recorder.finalize().unwrap();
        assert_eq!(summary.spans_persisted, 0);
        assert!(dir.path().join("trace_5.sqlite").exists());
    }
    
    #[test]
    fn test_open_failure_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("kts_0.sqlite");
        let result = Recorder::init_at(path, 0, FailurePolicy::Halt);
        assert!(matches!(result, Err(RecorderError::StorageFailed(_))));
    }
    
    #[test]
    fn test_finalize_commits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kts_2.sqlite");
        
        let recorder = Recorder::init_at(&path, 2, FailurePolicy::Halt).unwrap();
        let t = recorder.tracker();
        let id = t.begin_region("kernel", 0);
        t.end_region(id);
        t.record_alloc("view");
        t.begin_region("unmatched", 0);
        
        let summary = recorder.finalize().unwrap();
        assert_eq!(summary.rank, 2);
        assert_eq!(summary.spans_persisted, 1);
        assert_eq!(summary.events_persisted, 1);
        assert_eq!(summary.unmatched_spans, 1);
        
        let reader = StoreReader::open(&path).unwrap();
        assert_eq!(reader.spans().unwrap().len(), 1);
        assert_eq!(reader.events().unwrap()[0].rank, 2);
    }
    
    #[test]
    fn test_drop_without_finalize_discards() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kts_0.sqlite");
        
        {
            let recorder = Recorder::init_at(&path, 0, FailurePolicy::Halt).unwrap();
            recorder.tracker().record_event("lost");
        }
        
        let reader = StoreReader::open(&path).unwrap();
        assert!(reader.events().unwrap().is_empty());
    }
    
    #[test]
    fn test_abandon_surfaces_persist_failure() {
        let dir = tempdir().unwrap();
        let mut store = TraceStore::open(dir.path().join("kts_0.sqlite")).unwrap();
        store.begin().unwrap();
        let worker = PersistenceWorker::start(store, FailurePolicy::Halt).unwrap();
        
        // NaN binds as NULL and trips the NOT NULL constraint
        worker.enqueue(PersistJob::InsertSpan(SpanRecord {
            rank: 0,
            name: "k".to_string(),
            kind: "PARALLEL_FOR[0]".to_string(),
            start: f64::NAN,
            stop: 1.0,
        }));
        
        let failure = abandon(0, worker);
        assert!(matches!(failure, Some(RecorderError::PersistFailed(_))));
    }
    
    #[test]
    fn test_abandon_healthy_worker() {
        let dir = tempdir().unwrap();
        let mut store = TraceStore::open(dir.path().join("kts_0.sqlite")).unwrap();
        store.begin().unwrap();
        let worker = PersistenceWorker::start(store, FailurePolicy::Halt).unwrap();
        assert!(abandon(0, worker).is_none());
    }
}
