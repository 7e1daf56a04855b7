// packages/engine/src/utils/rank.rs
//! Execution rank resolution
//!
//! Order: explicit configuration, then `OMPI_COMM_WORLD_RANK`, then the pid.

use crate::utils::config::RecorderConfig;
use tracing::debug;

/// Rank variable exported by Open MPI launchers
pub const OMPI_RANK_VAR: &str = "OMPI_COMM_WORLD_RANK";

/// Resolve the rank for this process
pub fn resolve_rank(config: &RecorderConfig) -> i64 {
    rank_from(config.rank, std::env::var(OMPI_RANK_VAR).ok().as_deref(), std::process::id())
}

fn rank_from(configured: Option<i64>, mpi_rank: Option<&str>, pid: u32) -> i64 {
    if let Some(rank) = configured {
        debug!("Using configured rank {}", rank);
        return rank;
    }
    
    if let Some(rank) = mpi_rank.map(str::trim).filter(|s| !s.is_empty()) {
        match rank.parse::<i64>() {
            Ok(rank) => {
                debug!("Using {} rank {}", OMPI_RANK_VAR, rank);
                return rank;
            }
            Err(_) => debug!("Ignoring non-numeric {}={:?}", OMPI_RANK_VAR, rank),
        }
    }
    
    i64::from(pid)
}
