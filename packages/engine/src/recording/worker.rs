// packages/engine/src/recording/worker.rs
//! Single-writer persistence worker
//!
//! One background thread owns the store for the whole active lifetime of a
//! recorder. Producers append jobs under a short mutex hold; the worker swaps
//! the whole pending vector out and applies it with the lock released.
//!
//! ```text
//! begin/end ─┐
//! deep copy ─┼─ enqueue() ─→ Vec<PersistJob> ─ swap ─→ worker thread ─→ TraceStore
//! alloc     ─┘     (mutex)          ↑                     (in order)    (one txn)
//!                                 Condvar
//! ```
//!
//! Jobs are applied strictly in the order they were queued. A failed insert is
//! never retried or skipped: see [`FailurePolicy`].

use crate::recording::schema::{EventRecord, SpanRecord};
use crate::recording::storage::TraceStore;
use crate::utils::config::FailurePolicy;
use crate::utils::errors::{RecorderError, Result};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// A deferred write of one record
#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    InsertSpan(SpanRecord),
    InsertEvent(EventRecord),
}

impl fmt::Display for PersistJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistJob::InsertSpan(s) => write!(
                f,
                "Span was: {} {} {} {} {}",
                s.rank, s.name, s.kind, s.start, s.stop
            ),
            PersistJob::InsertEvent(e) => {
                write!(f, "Event was: {} {} {} {}", e.rank, e.name, e.kind, e.time)
            }
        }
    }
}

/// Destination for persistence jobs, owned by the worker thread
pub trait JobSink: Send + 'static {
    fn apply(&mut self, job: &PersistJob) -> Result<()>;
}

impl JobSink for TraceStore {
    fn apply(&mut self, job: &PersistJob) -> Result<()> {
        match job {
            PersistJob::InsertSpan(span) => self.insert_span(span),
            PersistJob::InsertEvent(event) => self.insert_event(event),
        }
    }
}

/// Sink that keeps jobs in memory, for exercising the pipeline without a store
#[derive(Debug, Default)]
pub struct MemorySink {
    pub jobs: Vec<PersistJob>,
}

impl JobSink for MemorySink {
    fn apply(&mut self, job: &PersistJob) -> Result<()> {
        self.jobs.push(job.clone());
        Ok(())
    }
}

struct QueueState {
    jobs: Vec<PersistJob>,
    stop: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cv: Condvar,
    enqueued: AtomicU64,
    applied: AtomicU64,
    batches: AtomicU64,
}

/// Cloneable producer handle onto a running worker's queue
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    /// Append a job and wake the worker
    pub fn enqueue(&self, job: PersistJob) {
        {
            let mut state = self.shared.state.lock();
            if state.stop {
                warn!("Persistence worker stopped, dropping job: {}", job);
                return;
            }
            state.jobs.push(job);
        }
        self.shared.cv.notify_one();
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("kts_jobs_enqueued_total").increment(1);
    }
    
    /// Jobs queued but not yet taken by the worker
    pub fn pending(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }
    
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            applied: self.shared.applied.load(Ordering::Relaxed),
            batches: self.shared.batches.load(Ordering::Relaxed),
        }
    }
}

/// Worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs accepted by `enqueue`
    pub enqueued: u64,
    
    /// Jobs successfully applied to the sink
    pub applied: u64,
    
    /// Queue swaps performed by the worker
    pub batches: u64,
}

/// Handle on the background thread; `join` consumes it
pub struct PersistenceWorker<S: JobSink> {
    queue: JobQueue,
    handle: JoinHandle<WorkerExit<S>>,
}

struct WorkerExit<S> {
    sink: S,
    failure: Option<RecorderError>,
}

impl<S: JobSink> PersistenceWorker<S> {
    /// Spawn the worker thread, moving the sink onto it
    pub fn start(sink: S, policy: FailurePolicy) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: Vec::new(),
                stop: false,
            }),
            cv: Condvar::new(),
            enqueued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        });
        
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("kts-persist".to_string())
            .spawn(move || worker_loop(sink, &thread_shared, policy))
            .map_err(|e| {
                RecorderError::WorkerFailed(format!("Failed to spawn persistence worker: {}", e))
            })?;
        
        debug!("Persistence worker started ({:?} on failure)", policy);
        
        Ok(Self {
            queue: JobQueue { shared },
            handle,
        })
    }
    
    /// Producer handle for this worker
    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }
    
    pub fn enqueue(&self, job: PersistJob) {
        self.queue.enqueue(job);
    }
    
    pub fn stats(&self) -> WorkerStats {
        self.queue.stats()
    }
    
    /// Stop accepting work, wait for every queued job to be applied and the
    /// thread to exit, then hand the sink back
    pub fn join(self) -> Result<S> {
        info!("Flushing {} remaining records", self.queue.pending());
        {
            let mut state = self.queue.shared.state.lock();
            state.stop = true;
        }
        self.queue.shared.cv.notify_one();
        
        let exit = self.handle.join().map_err(|_| {
            RecorderError::WorkerFailed("persistence worker panicked".to_string())
        })?;
        
        match exit.failure {
            Some(e) => Err(e),
            None => Ok(exit.sink),
        }
    }
}

fn worker_loop<S: JobSink>(mut sink: S, shared: &Shared, policy: FailurePolicy) -> WorkerExit<S> {
    loop {
        let batch = {
            let mut state = shared.state.lock();
            while state.jobs.is_empty() && !state.stop {
                shared.cv.wait(&mut state);
            }
            if state.jobs.is_empty() {
                // stop requested and fully drained
                break;
            }
            std::mem::take(&mut state.jobs)
        };
        
        shared.batches.fetch_add(1, Ordering::Relaxed);
        trace!("Applying batch of {} jobs", batch.len());
        
        let mut jobs = batch.into_iter();
        while let Some(job) = jobs.next() {
            if let Err(e) = sink.apply(&job) {
                error!("Execution failed: {}. {}", e, job);
                
                match policy {
                    FailurePolicy::Exit => {
                        eprintln!("kts: fatal: {}. {}", e, job);
                        std::process::exit(1);
                    }
                    FailurePolicy::Halt => {
                        let abandoned = {
                            let mut state = shared.state.lock();
                            state.stop = true;
                            jobs.len() + std::mem::take(&mut state.jobs).len()
                        };
                        error!("Persistence halted, {} queued records not persisted", abandoned);
                        return WorkerExit {
                            sink,
                            failure: Some(e),
                        };
                    }
                }
            }
            
            shared.applied.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("kts_jobs_persisted_total").increment(1);
        }
    }
    
    debug!(
        "Persistence worker exiting after {} jobs",
        shared.applied.load(Ordering::Relaxed)
    );
    
    WorkerExit {
        sink,
        failure: None,
    }
}
