use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{bind, ping, shutdown_signal};
use crate::jobs::master::{Master, MasterError};
use crate::jobs::worker::Analyzer;

#[derive(Clone)]
pub struct MasterState {
    pub master: Arc<Master>,
    /// Runs `/rs` analyses in-process.
    pub analyzer: Arc<dyn Analyzer>,
}

#[derive(Debug, Deserialize)]
struct RepoQuery {
    url: String,
}

/// Routes of the master: `/ping`, `GET /repo?url=`, `GET /rs?url=`.
pub fn router(state: MasterState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/repo", get(repo))
        .route("/rs", get(repo_stats))
        .with_state(state)
}

/// Serve on `addr` and poll the worker every `interval`.
pub async fn serve(addr: &str, state: MasterState, interval: Duration) -> Result<()> {
    let listener = bind(addr).await?;
    let poller = tokio::spawn(poll_loop(state.master.clone(), interval));
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    poller.abort();
    Ok(())
}

async fn poll_loop(master: Arc<Master>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let m = master.clone();
        match tokio::task::spawn_blocking(move || m.poll_once()).await {
            Ok(Ok(report)) if report.persisted + report.failed + report.expired > 0 => {
                info!(
                    persisted = report.persisted,
                    failed = report.failed,
                    expired = report.expired,
                    outstanding = report.outstanding,
                    "poll"
                );
            }
            Ok(Ok(report)) => debug!(outstanding = report.outstanding, "poll"),
            Ok(Err(e)) => warn!(error = %e, "cannot poll worker"),
            Err(e) => error!(error = %e, "poll task panicked"),
        }
    }
}

impl IntoResponse for MasterError {
    fn into_response(self) -> Response {
        let status = match &self {
            MasterError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            MasterError::Worker(_) => StatusCode::BAD_GATEWAY,
            MasterError::Scan(_) | MasterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Run blocking master work off the async executor.
async fn blocking<T, F>(f: F) -> Response
where
    T: serde::Serialize + Send + 'static,
    F: FnOnce() -> Result<T, MasterError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Json(value).into_response(),
        Ok(Err(e)) => {
            warn!(error = %e, "request failed");
            e.into_response()
        }
        Err(e) => {
            error!(error = %e, "request task panicked");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn repo(State(state): State<MasterState>, Query(q): Query<RepoQuery>) -> Response {
    blocking(move || state.master.request(&q.url)).await
}

async fn repo_stats(State(state): State<MasterState>, Query(q): Query<RepoQuery>) -> Response {
    blocking(move || state.master.stats(&q.url, state.analyzer.as_ref())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{RepoIdentity, RepoToken};
    use crate::domain::pipeline::ScanError;
    use crate::domain::stats::RepositoryStat;
    use crate::jobs::client::{WorkerClient, WorkerClientError};
    use crate::jobs::store::MemoryStore;
    use std::collections::HashMap;

    struct Offline;

    impl WorkerClient for Offline {
        fn query(&self, _url: &str) -> Result<RepoToken, WorkerClientError> {
            Err(WorkerClientError::Request("offline".into()))
        }

        fn check(
            &self,
            _tokens: &[RepoToken],
        ) -> Result<HashMap<RepoToken, RepositoryStat>, WorkerClientError> {
            Ok(HashMap::new())
        }
    }

    struct Local;

    impl Analyzer for Local {
        fn analyze(&self, _url: &str) -> Result<RepositoryStat, ScanError> {
            Ok(RepositoryStat {
                files_scanned: 2,
                ..Default::default()
            })
        }
    }

    fn state() -> MasterState {
        MasterState {
            master: Arc::new(Master::new(
                Arc::new(MemoryStore::new()),
                Arc::new(Offline),
                Duration::ZERO,
            )),
            analyzer: Arc::new(Local),
        }
    }

    fn q(url: &str) -> Query<RepoQuery> {
        Query(RepoQuery { url: url.into() })
    }

    #[tokio::test]
    async fn bad_url_is_bad_request() {
        let resp = repo(State(state()), q("nope")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_worker_is_bad_gateway() {
        let resp = repo(State(state()), q("https://github.com/a/b")).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn rs_computes_then_repo_reports_ready() {
        let s = state();
        let resp = repo_stats(State(s.clone()), q("https://github.com/a/b")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let token = RepoIdentity::parse("https://github.com/a/b").unwrap().token();
        let status = s.master.request("https://github.com/a/b").unwrap();
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            json!({ "status": "ready", "hash": token.as_str() })
        );
    }
}
