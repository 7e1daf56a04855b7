// packages/engine/src/recording/exporter.rs
//! Merge per-rank stores into one Chrome trace
//!
//! Output follows the Trace Event Format understood by `about:tracing` and
//! Perfetto. Instant events are appended in scan order; begin/end markers
//! derived from spans are sorted by timestamp across every input store so the
//! viewer sees a valid nesting. Ranks are told apart by `pid` only.

use crate::recording::schema::{EventRecord, SpanRecord};
use crate::recording::storage::StoreReader;
use crate::utils::errors::{RecorderError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// `otherData.version` of every exported trace
pub const TOOL_VERSION: &str = "kts chrome-tracing";

/// Trace event phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    #[serde(rename = "i")]
    Instant,
    
    #[serde(rename = "B")]
    Begin,
    
    #[serde(rename = "E")]
    End,
}

/// One entry of `traceEvents`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub name: String,
    pub cat: String,
    pub ph: Phase,
    
    /// Microseconds, as a decimal string
    pub ts: String,
    pub pid: i64,
    
    /// Present (and empty) on instant events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherData {
    pub version: String,
}

/// The top-level trace document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromeTrace {
    pub trace_events: Vec<TraceEvent>,
    pub display_time_unit: String,
    pub other_data: OtherData,
    pub stack_frames: Map<String, Value>,
    pub samples: Vec<Value>,
}

/// A span endpoint waiting for the global sort
#[derive(Debug, Clone)]
struct DurationMarker {
    pid: i64,
    name: String,
    cat: String,
    ph: Phase,
    ts_us: f64,
}

fn seconds_to_us(seconds: f64) -> f64 {
    seconds * 1_000_000.0
}

fn format_ts(us: f64) -> String {
    format!("{:.6}", us)
}

/// Accumulates records from any number of stores
#[derive(Debug, Default)]
pub struct TraceMerger {
    instants: Vec<TraceEvent>,
    markers: Vec<DurationMarker>,
    inputs: usize,
}

impl TraceMerger {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Read every event and span of one store. On error nothing from this
    /// store is added.
    pub fn add_store<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!("Reading trace {:?}", path);
        
        let reader = StoreReader::open(path)?;
        let events = reader.events()?;
        let spans = reader.spans()?;
        debug!("{:?}: {} events, {} spans", path, events.len(), spans.len());
        
        self.add_records(events, spans);
        Ok(())
    }
    
    /// Add already-decoded rows from one store
    pub fn add_records<E, S>(&mut self, events: E, spans: S)
    where
        E: IntoIterator<Item = EventRecord>,
        S: IntoIterator<Item = SpanRecord>,
    {
        self.inputs += 1;
        
        self.instants.extend(events.into_iter().map(|event| TraceEvent {
            name: event.name,
            cat: event.kind,
            ph: Phase::Instant,
            ts: format_ts(seconds_to_us(event.time)),
            pid: event.rank,
            args: Some(Map::new()),
        }));
        
        for span in spans {
            self.markers.push(DurationMarker {
                pid: span.rank,
                name: span.name.clone(),
                cat: span.kind.clone(),
                ph: Phase::Begin,
                ts_us: seconds_to_us(span.start),
            });
            self.markers.push(DurationMarker {
                pid: span.rank,
                name: span.name,
                cat: span.kind,
                ph: Phase::End,
                ts_us: seconds_to_us(span.stop),
            });
        }
    }
    
    /// Stores merged so far
    pub fn inputs(&self) -> usize {
        self.inputs
    }
    
    /// Sort the span markers and build the document
    pub fn finish(self) -> ChromeTrace {
        let mut markers = self.markers;
        // stable: ties keep scan order
        markers.sort_by(|a, b| a.ts_us.total_cmp(&b.ts_us));
        
        let mut trace_events = self.instants;
        trace_events.reserve(markers.len());
        trace_events.extend(markers.into_iter().map(|m| TraceEvent {
            name: m.name,
            cat: m.cat,
            ph: m.ph,
            ts: format_ts(m.ts_us),
            pid: m.pid,
            args: None,
        }));
        
        metrics::counter!("kts_export_records_total").increment(trace_events.len() as u64);
        
        ChromeTrace {
            trace_events,
            display_time_unit: "ms".to_string(),
            other_data: OtherData {
                version: TOOL_VERSION.to_string(),
            },
            stack_frames: Map::new(),
            samples: Vec::new(),
        }
    }
}

/// Merge the given stores, in order
pub fn merge_stores<I, P>(paths: I) -> Result<ChromeTrace>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut merger = TraceMerger::new();
    for path in paths {
        merger.add_store(path)?;
    }
    Ok(merger.finish())
}

/// Output layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Four-space indented JSON
    Pretty,
    
    /// Single-line JSON
    Compact,
}

/// Serializes a merged trace
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }
    
    /// Serialize to a string, newline terminated
    pub fn export(&self, trace: &ChromeTrace) -> Result<String> {
        let mut buf = Vec::new();
        self.write(trace, &mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| RecorderError::ExportFailed(format!("Invalid UTF-8 in trace: {}", e)))
    }
    
    /// Serialize into a writer, newline terminated
    pub fn write<W: Write>(&self, trace: &ChromeTrace, mut out: W) -> Result<()> {
        debug!(
            "Exporting {} trace events as {:?}",
            trace.trace_events.len(),
            self.format
        );
        
        let result = match self.format {
            ExportFormat::Pretty => {
                let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
                let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
                trace.serialize(&mut ser)
            }
            ExportFormat::Compact => serde_json::to_writer(&mut out, trace),
        };
        result.map_err(|e| {
            RecorderError::ExportFailed(format!("JSON serialization error: {}", e))
        })?;
        
        out.write_all(b"\n")
            .and_then(|_| out.flush())
            .map_err(|e| RecorderError::ExportFailed(format!("Write failed: {}", e)))
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportFormat::Pretty)
    }
}
