//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the story pipeline and its background driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Suggested delay before the next advance call after ordinary progress (seconds).
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,

    /// Suggested delay when another caller holds the unit of work (seconds).
    #[serde(default = "default_busy_retry_after")]
    pub busy_retry_after_secs: u64,

    /// Run the background driver that advances active stories.
    /// When disabled, stories only move when a client calls the advance endpoint.
    #[serde(default)]
    pub driver_enabled: bool,

    /// How often the driver scans for active stories (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub driver_poll_interval_ms: u64,

    /// Maximum stories the driver advances concurrently per tick.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_stories: usize,
}

fn default_retry_after() -> u64 {
    2
}

fn default_busy_retry_after() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    2000 // 2 seconds
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_after_secs: default_retry_after(),
            busy_retry_after_secs: default_busy_retry_after(),
            driver_enabled: false,
            driver_poll_interval_ms: default_poll_interval(),
            max_concurrent_stories: default_max_concurrent(),
        }
    }
}

/// Configuration for the stale-work recovery sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_enabled")]
    pub enabled: bool,

    /// How often the sweep runs (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Work untouched for longer than this is considered abandoned (seconds).
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_recovery_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_stale_after() -> u64 {
    900 // 15 minutes
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_recovery_enabled(),
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}
