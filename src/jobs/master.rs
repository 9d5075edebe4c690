use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::client::{WorkerClient, WorkerClientError};
use super::store::{CacheDocument, StatStore, StoreError};
use super::worker::Analyzer;
use crate::domain::identity::{RepoIdentity, RepoToken, UrlError};
use crate::domain::pipeline::ScanError;

#[derive(Debug, Error)]
pub enum MasterError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),
    #[error(transparent)]
    Worker(#[from] WorkerClientError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answer to "is this repository analysed yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RepoStatus {
    Processing,
    Ready { hash: RepoToken },
}

/// Default number of tokens asked about per `/check` call.
pub const DEFAULT_CHECK_BATCH: usize = 16;

/// Outcome of one polling round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub persisted: usize,
    pub failed: usize,
    pub expired: usize,
    /// `/check` batches the worker could not answer.
    pub unanswered: usize,
    pub outstanding: usize,
}

#[derive(Debug)]
struct Outstanding {
    identity: RepoIdentity,
    since: Instant,
}

/// Master side of the job protocol: issues work to a worker, tracks the
/// tokens it waits on and persists results as they become ready.
pub struct Master {
    store: Arc<dyn StatStore>,
    client: Arc<dyn WorkerClient>,
    /// Zero waits forever.
    max_wait: Duration,
    check_batch: usize,
    outstanding: Mutex<HashMap<RepoToken, Outstanding>>,
    /// One lock per repository analysed in-process by `stats`.
    computing: Mutex<HashMap<RepoToken, Arc<Mutex<()>>>>,
}

impl Master {
    pub fn new(store: Arc<dyn StatStore>, client: Arc<dyn WorkerClient>, max_wait: Duration) -> Self {
        Master {
            store,
            client,
            max_wait,
            check_batch: DEFAULT_CHECK_BATCH,
            outstanding: Mutex::new(HashMap::new()),
            computing: Mutex::new(HashMap::new()),
        }
    }

    /// Tokens per `/check` call, so one oversized result only stalls its
    /// own batch.
    pub fn with_check_batch(mut self, batch: usize) -> Self {
        self.check_batch = batch.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RepoToken, Outstanding>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }

    /// Persisted document for `identity`. Store failures read as a miss.
    fn cached(&self, identity: &RepoIdentity) -> Option<CacheDocument> {
        match self.store.get(&identity.token()) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(repo = %identity, error = %e, "cannot read cached stats");
                None
            }
        }
    }

    /// Status of `url`, queueing it on the worker when it is neither cached
    /// nor already outstanding.
    pub fn request(&self, url: &str) -> Result<RepoStatus, MasterError> {
        let identity = RepoIdentity::parse(url)?;
        let token = identity.token();
        if self.cached(&identity).is_some() {
            return Ok(RepoStatus::Ready { hash: token });
        }
        if self.lock().contains_key(&token) {
            return Ok(RepoStatus::Processing);
        }

        let remote = self.client.query(url)?;
        if remote != token {
            warn!(local = %token, %remote, "worker computed a different token");
        }
        info!(repo = %identity, %token, "queued on worker");
        self.lock().entry(token).or_insert(Outstanding {
            identity,
            since: Instant::now(),
        });
        Ok(RepoStatus::Processing)
    }

    /// Full statistics for `url`: the persisted document, or a fresh
    /// analysis run in the calling thread and persisted.
    ///
    /// Concurrent calls for the same repository run the analysis once; the
    /// others wait and read the persisted document.
    pub fn stats(&self, url: &str, analyzer: &dyn Analyzer) -> Result<CacheDocument, MasterError> {
        let identity = RepoIdentity::parse(url)?;
        if let Some(doc) = self.cached(&identity) {
            return Ok(doc);
        }

        let token = identity.token();
        let slot = self
            .computing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(token.clone())
            .or_default()
            .clone();
        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            self.compute(url, &identity, analyzer)
        };
        let mut computing = self.computing.lock().unwrap_or_else(PoisonError::into_inner);
        // the map and `slot` are the last two holders
        let last = computing.get(&token).is_some_and(|s| Arc::ptr_eq(s, &slot))
            && Arc::strong_count(&slot) == 2;
        if last {
            computing.remove(&token);
        }
        result
    }

    fn compute(
        &self,
        url: &str,
        identity: &RepoIdentity,
        analyzer: &dyn Analyzer,
    ) -> Result<CacheDocument, MasterError> {
        // a concurrent caller may have finished while we waited
        if let Some(doc) = self.cached(identity) {
            return Ok(doc);
        }
        let doc = CacheDocument::new(identity, analyzer.analyze(url)?);
        if let Err(e) = self.store.put(&doc) {
            // the fresh result is still served
            error!(repo = %identity, error = %e, "cannot persist stats");
        }
        Ok(doc)
    }

    /// One polling round: drop tokens waited on too long, ask the worker for
    /// the rest and persist whatever is ready.
    pub fn poll_once(&self) -> Result<PollReport, MasterError> {
        let mut report = PollReport::default();
        let tokens: Vec<RepoToken> = {
            let mut outstanding = self.lock();
            if !self.max_wait.is_zero() {
                outstanding.retain(|token, o| {
                    let keep = o.since.elapsed() <= self.max_wait;
                    if !keep {
                        warn!(%token, repo = %o.identity, "giving up on repository");
                        report.expired += 1;
                    }
                    keep
                });
            }
            outstanding.keys().cloned().collect()
        };
        if tokens.is_empty() {
            return Ok(report);
        }

        let mut ready = HashMap::new();
        let mut last_err = None;
        for batch in tokens.chunks(self.check_batch) {
            match self.client.check(batch) {
                Ok(found) => ready.extend(found),
                Err(e) => {
                    warn!(tokens = batch.len(), error = %e, "worker check failed");
                    report.unanswered += 1;
                    last_err = Some(e);
                }
            }
        }
        // only a round where no batch got through is an error
        match last_err {
            Some(e) if report.unanswered * self.check_batch >= tokens.len() => {
                return Err(e.into())
            }
            _ => {}
        }
        if ready.is_empty() {
            debug!(waiting = tokens.len(), "nothing ready");
        }
        for (token, stat) in ready {
            let Some(identity) = self.lock().get(&token).map(|o| o.identity.clone()) else {
                debug!(%token, "ignoring unrequested result");
                continue;
            };
            match self.store.put(&CacheDocument::new(&identity, stat)) {
                Ok(()) => {
                    info!(%token, repo = %identity, "stats persisted");
                    self.lock().remove(&token);
                    report.persisted += 1;
                }
                Err(e) => {
                    error!(%token, repo = %identity, error = %e, "cannot persist stats, will retry");
                    report.failed += 1;
                }
            }
        }
        report.outstanding = self.outstanding();
        Ok(report)
    }
}
