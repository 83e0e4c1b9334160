//! CLI command definitions and dispatch for the `conveyor` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a verb
//! pattern (`conveyor serve`, `conveyor worker`, `conveyor enqueue`, ...).

pub mod job;
pub mod serve;
pub mod worker;
pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Tenant-scoped job queue and workflow orchestration engine.
#[derive(Parser)]
#[command(name = "conveyor", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to conveyor.toml (defaults to ./conveyor.toml when present).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server with the background reconciler.
    Serve {
        /// Listen address override (e.g. 0.0.0.0:8420).
        #[arg(long)]
        listen: Option<String>,
    },

    /// Start a worker that claims and executes jobs.
    Worker {
        /// Worker identity; defaults to worker-<pid>.
        #[arg(long)]
        id: Option<String>,

        /// TOML file mapping definition keys to allowlisted commands.
        #[arg(long)]
        commands: PathBuf,
    },

    /// Enqueue a job.
    Enqueue {
        /// Job definition key (e.g. photos.sync-library).
        definition_key: String,

        /// Tenant the job belongs to.
        #[arg(long)]
        tenant: Uuid,

        /// JSON payload validated against the definition's schema.
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Lower runs first.
        #[arg(long, default_value_t = 100)]
        priority: i32,

        /// Suppress duplicates sharing this key while one is active.
        #[arg(long)]
        dedupe_key: Option<String>,

        /// Delay execution by this many seconds.
        #[arg(long)]
        delay_secs: Option<u32>,
    },

    /// Start a workflow run.
    Run {
        /// Workflow definition key.
        workflow_key: String,

        /// Tenant the run belongs to.
        #[arg(long)]
        tenant: Uuid,

        /// Run-level JSON payload shared by all steps.
        #[arg(long, default_value = "{}")]
        payload: String,

        #[arg(long, default_value_t = 100)]
        priority: i32,
    },

    /// Show a job (with attempts) or a workflow run (with steps) by id.
    Show {
        id: Uuid,
    },

    /// Cancel a job or a workflow run by id.
    Cancel {
        id: Uuid,

        #[arg(long, default_value = "canceled via CLI")]
        reason: String,
    },
}
