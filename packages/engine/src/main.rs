// packages/engine/src/main.rs
//! KTS Chrome trace exporter
//!
//! Merges one or more per-rank stores written by the recorder into a single
//! trace file for `about:tracing` / Perfetto.
//!
//! ```text
//! kts-chrome-trace kts_0.sqlite kts_1.sqlite -o trace.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use kts_engine::observability::init_tracing;
use kts_engine::recording::exporter::{ExportFormat, Exporter, TraceMerger};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

/// Generate a Chrome tracing JSON file from saved traces
#[derive(Debug, Parser)]
#[command(name = "kts-chrome-trace", version)]
struct ExportConfig {
    /// Trace stores to merge (one per rank)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    
    /// Output file
    #[arg(short, long, default_value = "trace.json")]
    output: PathBuf,
    
    /// Write single-line JSON instead of indented
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = ExportConfig::parse();
    
    let mut merger = TraceMerger::new();
    for input in &args.inputs {
        merger
            .add_store(input)
            .with_context(|| format!("Failed to read trace {}", input.display()))?;
    }
    
    info!("Merged {} stores", merger.inputs());
    let trace = merger.finish();
    
    let format = if args.compact {
        ExportFormat::Compact
    } else {
        ExportFormat::Pretty
    };
    
    info!("Writing {} events to {}", trace.trace_events.len(), args.output.display());
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    Exporter::new(format)
        .write(&trace, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    
    Ok(())
}
