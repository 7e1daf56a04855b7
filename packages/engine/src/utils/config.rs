// packages/engine/src/utils/config.rs
//! Recorder configuration
//!
//! Loaded from built-in defaults overlaid with `KTS_*` environment variables:
//!
//! | Variable            | Key             | Default   |
//! |---------------------|-----------------|-----------|
//! | `KTS_SQLITE_PREFIX` | `sqlite_prefix` | `kts_`    |
//! | `KTS_SQLITE_SUFFIX` | `sqlite_suffix` | `.sqlite` |
//! | `KTS_RANK`          | `rank`          | unset     |

use crate::utils::errors::Result;
use config::{Config, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Default store path prefix when `KTS_SQLITE_PREFIX` is unset
pub const DEFAULT_SQLITE_PREFIX: &str = "kts_";

/// Default store path suffix
pub const DEFAULT_SQLITE_SUFFIX: &str = ".sqlite";

const ENV_PREFIX: &str = "KTS";

/// What the persistence worker does when a write to the store fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Print a diagnostic and terminate the process with status 1
    #[default]
    Exit,
    
    /// Stop applying jobs and report the failure from `join`
    Halt,
}

/// Recorder configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Store path prefix; the rank and suffix are appended
    pub sqlite_prefix: String,
    
    /// Store path suffix
    pub sqlite_suffix: String,
    
    /// Explicit rank, bypassing MPI/pid detection
    #[serde(default)]
    pub rank: Option<i64>,
    
    /// Behaviour on a failed insert
    #[serde(skip)]
    pub failure_policy: FailurePolicy,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sqlite_prefix: DEFAULT_SQLITE_PREFIX.to_string(),
            sqlite_suffix: DEFAULT_SQLITE_SUFFIX.to_string(),
            rank: None,
            failure_policy: FailurePolicy::Exit,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::build(Environment::with_prefix(ENV_PREFIX).ignore_empty(true))
    }
    
    /// Load configuration from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(
            Environment::with_prefix(ENV_PREFIX)
                .ignore_empty(true)
                .source(Some(vars)),
        )
    }
    
    fn build(env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .set_default("sqlite_prefix", DEFAULT_SQLITE_PREFIX)?
            .set_default("sqlite_suffix", DEFAULT_SQLITE_SUFFIX)?
            .add_source(env)
            .build()?;
        
        Ok(settings.try_deserialize()?)
    }
    
    /// Use a specific failure policy
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
    
    /// Store file for a rank: `<prefix><rank><suffix>`
    pub fn store_path(&self, rank: i64) -> PathBuf {
        PathBuf::from(format!("{}{}{}", self.sqlite_prefix, rank, self.sqlite_suffix))
    }
}
