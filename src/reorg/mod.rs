pub mod artwork;
pub mod audit;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod ids;
pub mod lock;
pub mod orchestrator;
pub mod orphans;
pub mod paths;
pub mod quality;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod transcode;
pub mod util;

use anyhow::Result;

use crate::reorg::config::{FolioConfig, github_token};
use crate::reorg::store::{ContentStore, GitHubStore, LocalStore, RetryPolicy};

/// Build the content store selected by `cfg.store.backend`.
pub fn open_store(cfg: &FolioConfig) -> Result<Box<dyn ContentStore>> {
    if cfg.uses_local_backend() {
        return Ok(Box::new(LocalStore::new(cfg.store.local_root.trim())));
    }
    let retry = RetryPolicy {
        max_attempts: cfg.retry.max_attempts as usize,
        base_backoff_ms: cfg.retry.base_backoff_ms,
    };
    Ok(Box::new(GitHubStore::new(&cfg.store, github_token(), retry)?))
}
