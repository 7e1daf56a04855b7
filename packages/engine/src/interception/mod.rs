// packages/engine/src/interception/mod.rs
//! Profiling-hook interception layer
//!
//! - **Callbacks**: Safe adapter from the runtime's callback set onto a recorder
//! - **FFI**: `extern "C"` symbols exported from the shared library
//!
//! # Architecture
//!
//! ```text
//! Runtime (dlopen libkts_engine.so)
//!     │
//!     ├─ kokkosp_begin_parallel_for ─┐
//!     ├─ kokkosp_begin_fence ────────┼→ ProfilingHooks ─→ Recorder ─→ SpanTracker
//!     └─ kokkosp_begin_deep_copy ────┘   (fence filter)
//! ```

pub mod callbacks;
pub mod ffi;

// Re-export commonly used types
pub use callbacks::{ProfilingHooks, INTERNAL_FENCE_MARKER, UNTRACKED_ID};
pub use ffi::SpaceHandle;
