//! Task pool configuration.

use serde::{Deserialize, Serialize};

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
        }
    }
}

const fn default_worker_count() -> usize {
    4
}
