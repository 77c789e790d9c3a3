//! Run configuration for a restore batch.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration consumed by [`run_batch`](crate::pipeline::run_batch).
///
/// # Example
///
/// ```rust
/// use takeout_restore::config::RestoreConfig;
///
/// let config = RestoreConfig {
///     root: "./takeout".into(),
///     dry_run: true,
///     ..RestoreConfig::default()
/// };
/// assert!(config.concurrency >= 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Directory tree containing media files and their JSON sidecars.
    pub root: PathBuf,
    /// Perform every step except the final rename; report what would
    /// change.
    pub dry_run: bool,
    /// Maximum number of sidecars processed at once.
    pub concurrency: usize,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            dry_run: false,
            concurrency: default_concurrency(),
        }
    }
}

/// Worker count matching the machine, with a floor of one.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
