use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::cache::ResultCache;
use crate::domain::identity::{RepoIdentity, RepoToken, UrlError};
use crate::domain::pipeline::{Pipeline, ScanError};
use crate::domain::stats::RepositoryStat;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),
    #[error("job queue is full ({0} pending)")]
    Full(usize),
    #[error("job queue is shut down")]
    Closed,
}

/// What `enqueue` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// Already waiting or being analysed.
    Pending,
    /// A result is already cached.
    Ready,
}

/// A unit of work popped by a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub token: RepoToken,
    pub url: String,
}

/// Runs the analysis of one repository for the consumer loop.
pub trait Analyzer: Send + Sync {
    fn analyze(&self, url: &str) -> Result<RepositoryStat, ScanError>;
}

impl Analyzer for Pipeline {
    fn analyze(&self, url: &str) -> Result<RepositoryStat, ScanError> {
        self.analyze_url(url)
    }
}

#[derive(Debug)]
struct State {
    pending: VecDeque<Task>,
    /// Tokens queued or in flight.
    active: HashSet<RepoToken>,
    results: ResultCache,
    closed: bool,
}

/// Worker-side job state: a bounded FIFO of pending repositories and the
/// cache of finished results, shared by the HTTP handlers and the consumer.
#[derive(Debug)]
pub struct WorkerQueue {
    capacity: usize,
    state: Mutex<State>,
    available: Condvar,
}

impl WorkerQueue {
    pub fn new(capacity: usize, results: ResultCache) -> Self {
        WorkerQueue {
            capacity: capacity.max(1),
            state: Mutex::new(State {
                pending: VecDeque::new(),
                active: HashSet::new(),
                results,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit `url` unless its token is already pending or ready. The token
    /// is returned either way.
    pub fn enqueue(&self, url: &str) -> Result<(RepoToken, Admission), QueueError> {
        let token = RepoIdentity::parse(url)?.token();
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.results.contains(&token) {
            return Ok((token, Admission::Ready));
        }
        if state.active.contains(&token) {
            return Ok((token, Admission::Pending));
        }
        if state.pending.len() >= self.capacity {
            warn!(%url, pending = state.pending.len(), "queue full, rejecting");
            return Err(QueueError::Full(state.pending.len()));
        }

        state.active.insert(token.clone());
        state.pending.push_back(Task {
            token: token.clone(),
            url: url.trim().to_string(),
        });
        info!(%token, %url, pending = state.pending.len(), "queued");
        drop(state);
        self.available.notify_one();
        Ok((token, Admission::Queued))
    }

    /// Block until a task is available. `None` once the queue is closed and
    /// drained.
    pub fn next_task(&self) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if let Some(task) = state.pending.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn complete(&self, token: RepoToken, stat: RepositoryStat) {
        let mut state = self.lock();
        state.active.remove(&token);
        let expired = state.results.purge_expired();
        if expired > 0 {
            debug!(expired, "dropped expired results");
        }
        state.results.insert(token, Arc::new(stat));
    }

    /// Forget a failed task so the repository can be queued again.
    pub fn fail(&self, token: &RepoToken) {
        self.lock().active.remove(token);
    }

    /// The subset of `tokens` that are ready.
    pub fn check(&self, tokens: &[RepoToken]) -> HashMap<RepoToken, Arc<RepositoryStat>> {
        let mut state = self.lock();
        tokens
            .iter()
            .filter_map(|t| state.results.get(t).map(|s| (t.clone(), s)))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn ready_len(&self) -> usize {
        self.lock().results.len()
    }

    /// Stop admitting work and wake consumers so they can drain and exit.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }
}

/// Serial consumer: one repository at a time until the queue closes.
pub fn run_consumer(queue: &WorkerQueue, analyzer: &dyn Analyzer) {
    while let Some(task) = queue.next_task() {
        info!(token = %task.token, url = %task.url, "analysing");
        match analyzer.analyze(&task.url) {
            Ok(stat) => {
                info!(
                    token = %task.token,
                    contributors = stat.contributors.len(),
                    lines = stat.total_lines(),
                    "ready"
                );
                queue.complete(task.token, stat);
                debug!(ready = queue.ready_len(), pending = queue.pending_len(), "queue state");
            }
            Err(e) => {
                error!(token = %task.token, url = %task.url, error = %e, "cannot fetch repostat");
                queue.fail(&task.token);
            }
        }
    }
    info!("consumer stopped");
}

/// Run [`run_consumer`] on its own thread.
pub fn spawn_consumer(
    queue: Arc<WorkerQueue>,
    analyzer: Arc<dyn Analyzer>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("repocity-consumer".into())
        .spawn(move || run_consumer(&queue, analyzer.as_ref()))
}
