// packages/engine/src/recording/mod.rs
//! Span/event recording and trace export
//!
//! - **Schema**: Persisted row shapes and SQL text
//! - **Storage**: SQLite store (write side) and reader
//! - **Worker**: Single-writer background persistence thread
//! - **Tracker**: Live span table, per-thread region stacks, instrumentation API
//! - **Recorder**: Init/finalize lifecycle
//! - **Exporter**: Multi-rank merge to Chrome trace JSON
//!
//! # Architecture
//!
//! ```text
//! begin_region() ─┐                                       kts_<rank>.sqlite
//! end_region()   ─┼→ SpanTracker ─→ JobQueue ─→ worker ─→   Spans / Events
//! deep_copy()    ─┘  (DashMap)      (mutex)    (1 txn)            │
//!                                                                 ↓
//!                               kts-chrome-trace: TraceMerger ─→ trace.json
//! ```

pub mod exporter;
pub mod recorder;
pub mod schema;
pub mod storage;
pub mod tracker;
pub mod worker;

// Re-export commonly used types
pub use exporter::{merge_stores, ChromeTrace, ExportFormat, Exporter, Phase, TraceEvent, TraceMerger};
pub use recorder::{Recorder, RecorderSummary};
pub use schema::{EventRecord, SpanRecord};
pub use storage::{StoreReader, TraceStore};
pub use tracker::SpanTracker;
pub use worker::{JobQueue, JobSink, MemorySink, PersistJob, PersistenceWorker, WorkerStats};
