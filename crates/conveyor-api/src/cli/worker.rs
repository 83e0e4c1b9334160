//! `conveyor worker` - claim and execute jobs until interrupted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use conveyor_core::queue::{StaticCommandBuilder, Worker};
use serde::Deserialize;

use crate::state::AppState;

/// On-disk command allowlist: maps definition keys to programs.
///
/// ```toml
/// [commands."photos.sync-library"]
/// program = "/usr/local/bin/photosync"
/// args = ["sync"]
/// ```
#[derive(Debug, Deserialize)]
struct CommandsFile {
    #[serde(default)]
    commands: HashMap<String, CommandEntry>,
}

#[derive(Debug, Deserialize)]
struct CommandEntry {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

fn load_builder(path: &Path) -> anyhow::Result<StaticCommandBuilder> {
    let text = std::fs::read_to_string(path)?;
    let file: CommandsFile = toml::from_str(&text)?;
    if file.commands.is_empty() {
        anyhow::bail!("no commands registered in '{}'", path.display());
    }
    let mut builder = StaticCommandBuilder::new();
    for (key, entry) in file.commands {
        builder = builder.register(key, entry.program, entry.args);
    }
    Ok(builder)
}

pub async fn run(state: AppState, id: Option<String>, commands: &Path) -> anyhow::Result<()> {
    let worker_id = id.unwrap_or_else(|| format!("worker-{}", std::process::id()));
    let builder = Arc::new(load_builder(commands)?);

    let worker = Worker::new(
        state.store.clone(),
        builder,
        worker_id.clone(),
        state.config.worker.clone(),
    )
    .with_terminal_hook(state.engine.terminal_hook());

    let handle = worker.spawn();
    tracing::info!(worker_id = %worker_id, "worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining in-flight jobs");
    handle.shutdown().await;
    Ok(())
}
