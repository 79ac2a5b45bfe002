//! DispatcherConfig - dispatcher / worker pool の設定
//!
//! TOML などから serde で読み込める。省略したキーは既定値。

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Worker slots, and the number of jobs that may be `running` at once.
    pub pool_size: usize,
    /// Sleep between polls when nothing is pending.
    pub poll_interval_ms: u64,
    /// Fail `running` records left behind by a previous dispatcher on startup.
    pub recover_interrupted: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            poll_interval_ms: 1000,
            recover_interrupted: true,
        }
    }
}

impl DispatcherConfig {
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_recover_interrupted(mut self, recover: bool) -> Self {
        self.recover_interrupted = recover;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// `pool_size`, with zero treated as one.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.max(1)
    }
}

/// Half the available parallelism, at least one.
fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .map(|n| n / 2)
        .unwrap_or(1)
        .max(1)
}
