//! Application state wiring the queue and workflow services together.
//!
//! `AppState` pins the generic core services to their concrete SQLite
//! implementations and is shared by the CLI commands and the REST handlers.

use std::path::Path;
use std::sync::Arc;

use conveyor_core::workflow::WorkflowEngine;
use conveyor_infra::sqlite::job::SqliteJobStore;
use conveyor_infra::sqlite::pool::DatabasePool;
use conveyor_infra::sqlite::workflow::SqliteWorkflowRepository;
use conveyor_types::config::ConveyorConfig;

/// The workflow engine pinned to the SQLite store and repository.
pub type ConcreteEngine = WorkflowEngine<SqliteJobStore, SqliteWorkflowRepository>;

/// Shared application state for CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteJobStore>,
    pub repo: Arc<SqliteWorkflowRepository>,
    pub engine: Arc<ConcreteEngine>,
    pub config: ConveyorConfig,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to the database, run
    /// migrations, wire the engine.
    pub async fn init(config: ConveyorConfig) -> anyhow::Result<Self> {
        // The pool creates the database file, but not its parent directory.
        if let Some(path) = config.database_url.strip_prefix("sqlite://")
            && let Some(parent) = Path::new(path).parent()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db_pool = DatabasePool::new(&config.database_url).await?;
        let store = Arc::new(SqliteJobStore::new(db_pool.clone()));
        let repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let engine = Arc::new(WorkflowEngine::new(store.clone(), repo.clone()));

        Ok(Self {
            store,
            repo,
            engine,
            config,
            db_pool,
        })
    }
}

/// Load `ConveyorConfig` from an explicit path, `./conveyor.toml`, or
/// defaults when neither exists.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<ConveyorConfig> {
    let candidate = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| "conveyor.toml".into());
    if candidate.exists() {
        let text = std::fs::read_to_string(&candidate)?;
        let config = toml::from_str(&text)?;
        tracing::debug!(path = %candidate.display(), "loaded configuration");
        Ok(config)
    } else if path.is_some() {
        anyhow::bail!("config file '{}' not found", candidate.display())
    } else {
        Ok(ConveyorConfig::default())
    }
}
