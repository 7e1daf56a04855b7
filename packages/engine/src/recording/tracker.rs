// packages/engine/src/recording/tracker.rs
//! Span and event tracking: the instrumentation API
//!
//! Begin/end pairs are keyed by a monotonically increasing id and kept in a
//! sharded map until they end. Push/pop regions live on a LIFO stack per
//! calling thread, so one thread's pop never closes another thread's region. Nothing
//! here touches the store: completed records are snapshotted and handed to the
//! persistence worker.
//!
//! Every timestamp is seconds elapsed since the recorder epoch, so stores from
//! different ranks share a zero-aligned timeline.

use crate::recording::schema::{
    device_kind, EventRecord, SpanRecord, KIND_ALLOCATE, KIND_DEALLOCATE, KIND_DEEPCOPY,
    KIND_EVENT, KIND_FENCE, KIND_PARFOR, KIND_REGION,
};
use crate::recording::worker::{JobQueue, PersistJob};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::{debug, trace};

/// A span that has begun but not ended
#[derive(Debug, Clone)]
struct LiveSpan {
    name: String,
    kind: String,
    start: f64,
}

/// In-process span/event state for one recorder
pub struct SpanTracker {
    rank: i64,
    epoch: Instant,
    next_id: AtomicU64,
    live: DashMap<u64, LiveSpan>,
    regions: DashMap<ThreadId, Vec<LiveSpan>>,
    queue: JobQueue,
}

impl SpanTracker {
    pub fn new(rank: i64, epoch: Instant, queue: JobQueue) -> Self {
        Self {
            rank,
            epoch,
            next_id: AtomicU64::new(0),
            live: DashMap::new(),
            regions: DashMap::new(),
            queue,
        }
    }
    
    /// Seconds since the recorder epoch
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
    
    pub fn rank(&self) -> i64 {
        self.rank
    }
    
    /// Start a parallel region; returns the id to pass to [`end_region`](Self::end_region)
    pub fn begin_region(&self, name: &str, device_index: u32) -> u64 {
        self.begin(name, device_kind(KIND_PARFOR, device_index))
    }
    
    pub fn end_region(&self, id: u64) {
        self.end(id);
    }
    
    /// Start a fence; returns the id to pass to [`end_fence`](Self::end_fence)
    pub fn begin_fence(&self, name: &str, device_index: u32) -> u64 {
        self.begin(name, device_kind(KIND_FENCE, device_index))
    }
    
    pub fn end_fence(&self, id: u64) {
        self.end(id);
    }
    
    /// Open a nested named region on the calling thread's stack
    pub fn push_region(&self, name: &str) {
        // ids stay unique across both span styles
        self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stack = self.regions.entry(thread::current().id()).or_default();
        stack.push(LiveSpan {
            name: name.to_string(),
            kind: KIND_REGION.to_string(),
            start: self.now(),
        });
    }
    
    /// Close the calling thread's innermost region. No-op on an empty stack.
    pub fn pop_region(&self) {
        let popped = match self.regions.get_mut(&thread::current().id()) {
            // stop is taken under the same guard as the pop
            Some(mut stack) => stack.pop().map(|span| (span, self.now())),
            None => None,
        };
        match popped {
            Some((span, stop)) => self.submit_span(span, stop),
            None => trace!("pop_region on empty stack"),
        }
    }
    
    /// Record a deep copy as `<src>[<src_space>]-><dst>[<dst_space>](<size>)`
    pub fn record_deep_copy(
        &self,
        dst_space: &str,
        dst_name: &str,
        src_space: &str,
        src_name: &str,
        size_bytes: u64,
    ) {
        let name = format!(
            "{}[{}]->{}[{}]({})",
            src_name, src_space, dst_name, dst_space, size_bytes
        );
        self.submit_event(name, KIND_DEEPCOPY);
    }
    
    pub fn record_alloc(&self, name: &str) {
        self.submit_event(name.to_string(), KIND_ALLOCATE);
    }
    
    pub fn record_dealloc(&self, name: &str) {
        self.submit_event(name.to_string(), KIND_DEALLOCATE);
    }
    
    /// Generic one-shot marker
    pub fn record_event(&self, name: &str) {
        self.submit_event(name.to_string(), KIND_EVENT);
    }
    
    /// Spans begun by id and not yet ended
    pub fn live_spans(&self) -> usize {
        self.live.len()
    }
    
    /// Regions pushed and not yet popped, across all threads
    pub fn region_depth(&self) -> usize {
        self.regions.iter().map(|stack| stack.value().len()).sum()
    }
    
    fn begin(&self, name: &str, kind: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let span = LiveSpan {
            name: name.to_string(),
            kind,
            start: self.now(),
        };
        trace!("begin {} {} ({})", id, span.name, span.kind);
        self.live.insert(id, span);
        id
    }
    
    fn end(&self, id: u64) {
        let stop = self.now();
        match self.live.remove(&id) {
            Some((_, span)) => self.submit_span(span, stop),
            None => debug!("end for unknown span id {}", id),
        }
    }
    
    fn submit_span(&self, span: LiveSpan, stop: f64) {
        self.queue.enqueue(PersistJob::InsertSpan(SpanRecord {
            rank: self.rank,
            name: span.name,
            kind: span.kind,
            start: span.start,
            stop,
        }));
    }
    
    fn submit_event(&self, name: String, kind: &str) {
        self.queue.enqueue(PersistJob::InsertEvent(EventRecord {
            rank: self.rank,
            name,
            kind: kind.to_string(),
            time: self.now(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::worker::{MemorySink, PersistenceWorker};
    use crate::utils::config::FailurePolicy;
    use proptest::prelude::*;
    use std::time::Duration;
    
    /// Run `f` against a fresh tracker and return everything it persisted
    fn collect<F: FnOnce(&SpanTracker)>(rank: i64, f: F) -> Vec<PersistJob> {
        let worker = PersistenceWorker::start(MemorySink::default(), FailurePolicy::Halt).unwrap();
        let tracker = SpanTracker::new(rank, Instant::now(), worker.queue());
        f(&tracker);
        drop(tracker);
        worker.join().unwrap().jobs
    }
    
    fn spans(jobs: &[PersistJob]) -> Vec<SpanRecord> {
        jobs.iter()
            .filter_map(|job| match job {
                PersistJob::InsertSpan(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
    
    fn events(jobs: &[PersistJob]) -> Vec<EventRecord> {
        jobs.iter()
            .filter_map(|job| match job {
                PersistJob::InsertEvent(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }
    
    #[test]
    fn test_ids_are_sequential() {
        collect(0, |t| {
            assert_eq!(t.begin_region("a", 0), 0);
            assert_eq!(t.begin_fence("b", 0), 1);
            t.push_region("c");
            assert_eq!(t.begin_region("d", 0), 3);
        });
    }
    
    #[test]
    fn test_region_span() {
        let jobs = collect(4, |t| {
            let id = t.begin_region("kernel", 1);
            assert_eq!(t.live_spans(), 1);
            std::thread::sleep(Duration::from_millis(2));
            t.end_region(id);
            assert_eq!(t.live_spans(), 0);
        });
        
        let spans = spans(&jobs);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].rank, 4);
        assert_eq!(spans[0].name, "kernel");
        assert_eq!(spans[0].kind, "PARALLEL_FOR[1]");
        assert!(spans[0].duration() >= 0.002);
    }
    
    #[test]
    fn test_fence_kind() {
        let jobs = collect(0, |t| {
            let id = t.begin_fence("sync", 2);
            t.end_fence(id);
        });
        assert_eq!(spans(&jobs)[0].kind, "FENCE[2]");
    }
    
    #[test]
    fn test_interleaved_ids() {
        let jobs = collect(0, |t| {
            let a = t.begin_region("a", 0);
            let b = t.begin_region("b", 0);
            t.end_region(a);
            t.end_region(b);
        });
        let names: Vec<_> = spans(&jobs).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
    
    #[test]
    fn test_unknown_and_unmatched_ids_emit_nothing() {
        let jobs = collect(0, |t| {
            t.end_region(42);
            t.begin_region("never ends", 0);
            assert_eq!(t.live_spans(), 1);
        });
        assert!(jobs.is_empty());
    }
    
    #[test]
    fn test_pop_empty_stack_is_noop() {
        let jobs = collect(0, |t| {
            t.pop_region();
            t.push_region("outer");
            t.pop_region();
            t.pop_region();
            assert_eq!(t.region_depth(), 0);
        });
        let spans = spans(&jobs);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, "REGION");
    }
    
    #[test]
    fn test_deep_copy_name() {
        let jobs = collect(0, |t| {
            t.record_deep_copy("HostSpace", "b", "DeviceSpace", "a", 800);
        });
        let events = events(&jobs);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "a[DeviceSpace]->b[HostSpace](800)");
        assert_eq!(events[0].kind, "DEEPCOPY");
    }
    
    #[test]
    fn test_alloc_events() {
        let jobs = collect(1, |t| {
            t.record_alloc("view");
            t.record_dealloc("view");
            t.record_event("checkpoint");
        });
        let kinds: Vec<_> = events(&jobs).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["ALLOCATE", "DEALLOCATE", "EVENT"]);
    }
    
    #[test]
    fn test_concurrent_instrumentation() {
        let jobs = collect(0, |t| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..100 {
                            let id = t.begin_region("k", 0);
                            t.end_region(id);
                        }
                    });
                }
            });
            assert_eq!(t.live_spans(), 0);
        });
        assert_eq!(spans(&jobs).len(), 400);
    }
    
    #[test]
    fn test_pop_on_other_thread_leaves_region_open() {
        let jobs = collect(0, |t| {
            t.push_region("main");
            std::thread::scope(|s| {
                s.spawn(|| t.pop_region());
            });
            assert_eq!(t.region_depth(), 1);
            t.pop_region();
        });
        let spans = spans(&jobs);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "main");
    }
    
    #[test]
    fn test_concurrent_push_pop_threads() {
        let jobs = collect(0, |t| {
            std::thread::scope(|s| {
                for p in 0..4 {
                    s.spawn(move || {
                        for i in 0..2_000 {
                            t.push_region(&format!("p{}", p));
                            if i % 2 == 1 {
                                t.pop_region();
                                t.pop_region();
                            }
                        }
                    });
                }
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..2_000 {
                            t.pop_region();
                        }
                    });
                }
            });
            assert_eq!(t.region_depth(), 0);
        });
        
        let spans = spans(&jobs);
        assert_eq!(spans.len(), 8_000);
        for span in &spans {
            assert!(span.stop >= span.start, "{} > {}", span.start, span.stop);
        }
    }
    
    proptest! {
        #[test]
        fn prop_pop_never_fabricates(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let mut depth = 0usize;
            let mut expected = 0usize;
            for &push in &ops {
                if push {
                    depth += 1;
                } else if depth > 0 {
                    depth -= 1;
                    expected += 1;
                }
            }
            
            let jobs = collect(0, |t| {
                for &push in &ops {
                    if push { t.push_region("r") } else { t.pop_region() }
                }
            });
            prop_assert_eq!(spans(&jobs).len(), expected);
        }
        
        #[test]
        fn prop_balanced_regions_nest(k in 1usize..16) {
            let jobs = collect(0, |t| {
                for i in 0..k {
                    t.push_region(&format!("r{}", i));
                }
                for _ in 0..k {
                    t.pop_region();
                }
            });
            
            let spans = spans(&jobs);
            prop_assert_eq!(spans.len(), k);
            for (i, span) in spans.iter().enumerate() {
                prop_assert_eq!(&span.name, &format!("r{}", k - 1 - i));
            }
            for pair in spans.windows(2) {
                // later pops enclose earlier ones
                prop_assert!(pair[1].start <= pair[0].start);
                prop_assert!(pair[0].stop <= pair[1].stop);
            }
        }
    }
}
