// src/config/scheduler.rs
use serde::{Deserialize, Serialize};

/// Periodic-driver intervals and batch sizes (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub synthesis_interval_secs: u64,
    pub synthesis_batch_size: usize,
    pub utility_interval_secs: u64,
    pub orphan_interval_secs: u64,
    pub orphan_lookback_hours: i64,
    pub inactivity_timeout_mins: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            synthesis_interval_secs: 10,
            synthesis_batch_size: 10,
            utility_interval_secs: 24 * 3600,
            orphan_interval_secs: 3600,
            orphan_lookback_hours: 24,
            inactivity_timeout_mins: 30,
        }
    }
}
