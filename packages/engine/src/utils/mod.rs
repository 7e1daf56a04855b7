// packages/engine/src/utils/mod.rs
//! Common utilities and helpers
//!
//! - **errors**: Crate-wide error type
//! - **config**: Environment-driven recorder configuration
//! - **rank**: Execution rank resolution

pub mod config;
pub mod errors;
pub mod rank;

pub use config::{FailurePolicy, RecorderConfig};
pub use errors::{RecorderError, Result};
pub use rank::resolve_rank;
