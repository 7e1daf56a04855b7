// packages/engine/src/interception/callbacks.rs
//! Profiling-hook adapter
//!
//! Translates the runtime's fixed set of profiling callbacks into calls on a
//! [`Recorder`]. Owns the recorder between `init_library` and
//! `finalize_library`; callbacks arriving outside that window are ignored.
//!
//! Fences the runtime issues on the tool's own behalf are not tracked: they
//! get [`UNTRACKED_ID`] and the matching end is dropped.

use crate::recording::recorder::{Recorder, RecorderSummary};
use crate::recording::tracker::SpanTracker;
use crate::utils::config::RecorderConfig;
use crate::utils::errors::Result;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Label carried by fences the runtime injects for profiling tools
pub const INTERNAL_FENCE_MARKER: &str = "Kokkos Profile Tool Fence";

/// Id handed out for work that is deliberately not recorded
pub const UNTRACKED_ID: u64 = u64::MAX;

enum HookState {
    Uninitialized,
    Active(Recorder),
    Closed,
}

/// Recorder ownership plus the callback surface
pub struct ProfilingHooks {
    state: RwLock<HookState>,
}

static GLOBAL_HOOKS: Lazy<ProfilingHooks> = Lazy::new(ProfilingHooks::new);

/// Process-wide hooks used by the C entry points
pub fn global() -> &'static ProfilingHooks {
    &GLOBAL_HOOKS
}

impl ProfilingHooks {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HookState::Uninitialized),
        }
    }
    
    /// Start recording. A second call while active is ignored.
    pub fn init_library(&self, config: &RecorderConfig) -> Result<()> {
        let mut state = self.state.write();
        if let HookState::Active(recorder) = &*state {
            warn!("init_library called twice; still recording to {:?}", recorder.path());
            return Ok(());
        }
        
        *state = HookState::Active(Recorder::init(config)?);
        Ok(())
    }
    
    /// Flush, commit and close. Returns `None` if nothing was recording.
    pub fn finalize_library(&self) -> Result<Option<RecorderSummary>> {
        let previous = std::mem::replace(&mut *self.state.write(), HookState::Closed);
        match previous {
            HookState::Active(recorder) => recorder.finalize().map(Some),
            HookState::Uninitialized | HookState::Closed => {
                debug!("finalize_library without an active recorder");
                Ok(None)
            }
        }
    }
    
    pub fn is_active(&self) -> bool {
        matches!(&*self.state.read(), HookState::Active(_))
    }
    
    fn with_tracker<R>(&self, f: impl FnOnce(&SpanTracker) -> R) -> Option<R> {
        match &*self.state.read() {
            HookState::Active(recorder) => Some(f(recorder.tracker())),
            _ => None,
        }
    }
    
    pub fn begin_parallel_for(&self, name: &str, device_id: u32) -> u64 {
        self.with_tracker(|t| t.begin_region(name, device_id))
            .unwrap_or(UNTRACKED_ID)
    }
    
    pub fn end_parallel_for(&self, id: u64) {
        if id != UNTRACKED_ID {
            self.with_tracker(|t| t.end_region(id));
        }
    }
    
    pub fn push_profile_region(&self, name: &str) {
        self.with_tracker(|t| t.push_region(name));
    }
    
    pub fn pop_profile_region(&self) {
        self.with_tracker(|t| t.pop_region());
    }
    
    pub fn begin_deep_copy(
        &self,
        dst_space: &str,
        dst_name: &str,
        src_space: &str,
        src_name: &str,
        size: u64,
    ) {
        self.with_tracker(|t| t.record_deep_copy(dst_space, dst_name, src_space, src_name, size));
    }
    
    pub fn begin_fence(&self, name: &str, device_id: u32) -> u64 {
        if name.contains(INTERNAL_FENCE_MARKER) {
            return UNTRACKED_ID;
        }
        self.with_tracker(|t| t.begin_fence(name, device_id))
            .unwrap_or(UNTRACKED_ID)
    }
    
    pub fn end_fence(&self, id: u64) {
        if id != UNTRACKED_ID {
            self.with_tracker(|t| t.end_fence(id));
        }
    }
    
    pub fn allocate_data(&self, space: &str, name: &str, size: u64) {
        self.with_tracker(|t| t.record_alloc(&allocation_label(space, name, size)));
    }
    
    pub fn deallocate_data(&self, space: &str, name: &str, size: u64) {
        self.with_tracker(|t| t.record_dealloc(&allocation_label(space, name, size)));
    }
    
    pub fn profile_event(&self, name: &str) {
        self.with_tracker(|t| t.record_event(name));
    }
}

impl Default for ProfilingHooks {
    fn default() -> Self {
        Self::new()
    }
}

fn allocation_label(space: &str, name: &str, size: u64) -> String {
    format!("{}[{}]({})", name, space, size)
}
