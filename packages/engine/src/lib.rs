// packages/engine/src/lib.rs
//! KTS recording engine
//!
//! Records spans (begin/end durations) and instant events emitted by a
//! parallel runtime's profiling hooks, persists them per rank into SQLite
//! off the hot path, and merges the per-rank stores into a Chrome trace.
//!
//! # Architecture
//!
//! - **recording**: Tracker, persistence worker, lifecycle, storage, export
//! - **interception**: Profiling-hook adapter and its C ABI entry points
//! - **observability**: Logging and metrics setup
//! - **utils**: Errors, configuration, rank resolution
//!
//! # Example
//!
//! ```no_run
//! use kts_engine::{Recorder, RecorderConfig};
//!
//! let recorder = Recorder::init(&RecorderConfig::load()?)?;
//! let id = recorder.tracker().begin_region("axpy", 0);
//! recorder.tracker().end_region(id);
//! recorder.finalize()?;
//! # Ok::<(), kts_engine::RecorderError>(())
//! ```

pub mod interception;
pub mod observability;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use recording::recorder::{Recorder, RecorderSummary};
pub use recording::tracker::SpanTracker;
pub use utils::config::{FailurePolicy, RecorderConfig};
pub use utils::errors::{RecorderError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
