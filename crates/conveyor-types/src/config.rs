//! Global configuration for Conveyor.
//!
//! `ConveyorConfig` is the top-level `conveyor.toml`. Every field has a
//! sensible default so an empty file (or no file) yields a working setup.

use serde::{Deserialize, Serialize};

/// Top-level configuration, loaded from `conveyor.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConveyorConfig {
    /// SQLite database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// REST API listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub worker: WorkerSettings,

    /// Reconciler sweep interval in seconds.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

fn default_database_url() -> String {
    let data_dir = std::env::var("CONVEYOR_DATA_DIR").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.conveyor")
    });
    format!("sqlite://{data_dir}/conveyor.db")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8420".to_string()
}

fn default_reconcile_interval() -> u64 {
    10
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            listen_addr: default_listen_addr(),
            worker: WorkerSettings::default(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

/// Tuning knobs for the worker polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Queue poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Jobs claimed per poll tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Lease duration granted on claim and extended on heartbeat.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u32,

    /// Worker heartbeat interval in seconds (observability row).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// How often captured output tails are flushed to the attempt row.
    #[serde(default = "default_log_flush_interval")]
    pub log_flush_interval_secs: u64,

    /// How often a running job checks for a cancellation request.
    #[serde(default = "default_cancel_poll_interval")]
    pub cancel_poll_interval_secs: u64,

    /// Maximum characters retained per output stream.
    #[serde(default = "default_tail_cap")]
    pub tail_cap_chars: usize,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    2
}

fn default_lease_seconds() -> u32 {
    120
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_log_flush_interval() -> u64 {
    2
}

fn default_cancel_poll_interval() -> u64 {
    1
}

fn default_tail_cap() -> usize {
    20_000
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            lease_seconds: default_lease_seconds(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            log_flush_interval_secs: default_log_flush_interval(),
            cancel_poll_interval_secs: default_cancel_poll_interval(),
            tail_cap_chars: default_tail_cap(),
        }
    }
}
