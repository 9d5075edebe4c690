//! HTTP surfaces of the worker and master processes.

pub mod master;
pub mod worker;

use anyhow::{Context, Result};
use axum::Json;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
}
