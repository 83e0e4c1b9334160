//! `conveyor serve` - REST API server plus the background reconciler.

use std::time::Duration;

use conveyor_core::workflow::Reconciler;

use crate::http::router::build_router;
use crate::state::AppState;

pub async fn serve(state: AppState, listen: Option<String>) -> anyhow::Result<()> {
    let addr = listen.unwrap_or_else(|| state.config.listen_addr.clone());

    let reconciler = Reconciler::new(
        state.store.clone(),
        state.repo.clone(),
        state.engine.clone(),
        Duration::from_secs(state.config.reconcile_interval_secs),
    )
    .spawn();

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    reconciler.shutdown().await;
    Ok(())
}
