// packages/engine/src/observability/mod.rs
//! Logging and metrics
//!
//! Diagnostics go to stderr so the instrumented program's stdout is left
//! alone. Metrics are emitted through the `metrics` facade; installing an
//! exporter is up to the embedding application.
//!
//! | Counter                     | Incremented when                     |
//! |-----------------------------|--------------------------------------|
//! | `kts_jobs_enqueued_total`   | a record is queued for persistence   |
//! | `kts_jobs_persisted_total`  | the worker writes a record           |
//! | `kts_spans_unmatched_total` | finalize finds spans that never ended |
//! | `kts_export_records_total`  | the exporter emits trace events      |

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the `info` default.
/// Returns false when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        assert!(!init_tracing());
    }
}
