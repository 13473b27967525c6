//! Minimal operational surface: a health probe and a Prometheus scrape
//! endpoint for the process metrics.

use axum::{extract::State, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tracing::info;

pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(handle)
}

pub async fn serve(addr: String, handle: PrometheusHandle) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "admin listener started");
    axum::serve(listener, router(handle)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
