use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{bind, ping, shutdown_signal};
use crate::domain::identity::RepoToken;
use crate::jobs::worker::{spawn_consumer, Analyzer, QueueError, WorkerQueue};

/// Routes of the worker: `/ping`, `POST /query`, `POST /check`.
pub fn router(queue: Arc<WorkerQueue>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/query", post(query))
        .route("/check", post(check))
        .with_state(queue)
}

/// Serve on `addr` with a serial consumer analysing queued repositories.
pub async fn serve(addr: &str, queue: Arc<WorkerQueue>, analyzer: Arc<dyn Analyzer>) -> Result<()> {
    let listener = bind(addr).await?;
    spawn_consumer(queue.clone(), analyzer)?;
    axum::serve(listener, router(queue.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    queue.close();
    Ok(())
}

async fn query(State(queue): State<Arc<WorkerQueue>>, body: String) -> Response {
    match queue.enqueue(&body) {
        Ok((token, admission)) => {
            debug!(%token, ?admission, "query");
            (StatusCode::OK, token.to_string()).into_response()
        }
        Err(e @ QueueError::InvalidUrl(_)) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// Comma-separated tokens in, `{token: stat}` for the ready ones out.
async fn check(State(queue): State<Arc<WorkerQueue>>, body: String) -> Response {
    let tokens: Vec<RepoToken> = body
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let token = RepoToken::parse(s);
            if token.is_none() {
                warn!(token = s.trim(), "ignoring malformed token");
            }
            token
        })
        .collect();

    let ready = queue.check(&tokens);
    if ready.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let body: HashMap<&RepoToken, _> = ready.iter().map(|(t, s)| (t, s.as_ref())).collect();
    Json(body).into_response()
}
