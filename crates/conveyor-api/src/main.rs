//! Conveyor CLI and REST API entry point.
//!
//! Binary name: `conveyor`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler or starts the API server.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands};
use state::{AppState, load_config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    conveyor_observe::tracing_setup::init_tracing(cli.log_json)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let config = load_config(cli.config.as_deref())?;
    let state = AppState::init(config).await?;

    match cli.command {
        Commands::Serve { listen } => {
            cli::serve::serve(state, listen).await?;
        }

        Commands::Worker { id, commands } => {
            cli::worker::run(state, id, &commands).await?;
        }

        Commands::Enqueue {
            definition_key,
            tenant,
            payload,
            priority,
            dedupe_key,
            delay_secs,
        } => {
            cli::job::enqueue(
                &state,
                definition_key,
                tenant,
                &payload,
                priority,
                dedupe_key,
                delay_secs,
                cli.json,
            )
            .await?;
        }

        Commands::Run {
            workflow_key,
            tenant,
            payload,
            priority,
        } => {
            cli::workflow::run(&state, &workflow_key, tenant, &payload, priority, cli.json)
                .await?;
        }

        Commands::Show { id } => {
            // The id space is shared; try jobs first, then runs.
            if !cli::job::show(&state, id, cli.json).await?
                && !cli::workflow::show(&state, id, cli.json).await?
            {
                anyhow::bail!("no job or workflow run with id {id}");
            }
        }

        Commands::Cancel { id, reason } => {
            if !cli::job::cancel(&state, id, &reason, cli.json).await?
                && !cli::workflow::cancel(&state, id, &reason, cli.json).await?
            {
                anyhow::bail!("no job or workflow run with id {id}");
            }
        }
    }

    Ok(())
}
