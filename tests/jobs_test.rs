//! Master and worker talking over real HTTP on loopback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use repocity::domain::identity::RepoIdentity;
use repocity::domain::pipeline::ScanError;
use repocity::domain::stats::{Contributor, RepositoryStat};
use repocity::jobs::cache::ResultCache;
use repocity::jobs::client::{HttpWorkerClient, WorkerClient, WorkerClientError};
use repocity::jobs::master::{Master, RepoStatus};
use repocity::jobs::store::{JsonDirStore, StatStore};
use repocity::jobs::worker::{spawn_consumer, Analyzer, WorkerQueue};
use repocity::server;

/// Counts analyses and returns one fixed contributor.
struct Fixed(AtomicUsize);

impl Analyzer for Fixed {
    fn analyze(&self, _url: &str) -> Result<RepositoryStat, ScanError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        Ok(RepositoryStat {
            contributors: vec![Contributor {
                email: "dev@example.com".into(),
                ..Default::default()
            }],
            files_scanned: 1,
            ..Default::default()
        })
    }
}

/// A repository with enough contributors to serialise to well over 10 MB.
struct Crowded;

impl Analyzer for Crowded {
    fn analyze(&self, _url: &str) -> Result<RepositoryStat, ScanError> {
        Ok(RepositoryStat {
            contributors: (0..20_000)
                .map(|i| Contributor {
                    email: format!("contributor-{i:05}@example.com"),
                    ..Default::default()
                })
                .collect(),
            files_scanned: 1,
            ..Default::default()
        })
    }
}

/// Worker with a running consumer behind a loopback listener; returns its
/// base URL.
async fn spawn_worker(analyzer: Arc<dyn Analyzer>) -> (Arc<WorkerQueue>, String) {
    let queue = Arc::new(WorkerQueue::new(8, ResultCache::new(8, None)));
    spawn_consumer(queue.clone(), analyzer).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::worker::router(queue.clone());
    tokio::spawn(async move { axum::serve(listener, app).await });
    (queue, format!("http://{addr}"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_is_computed_once_and_persisted() {
    let analyzer = Arc::new(Fixed(AtomicUsize::new(0)));
    let (queue, base) = spawn_worker(analyzer.clone()).await;

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonDirStore::new(store_dir.path()));
    let master = Arc::new(Master::new(
        store.clone(),
        Arc::new(HttpWorkerClient::new(base)),
        Duration::from_secs(60),
    ));

    let url = "https://github.com/Acme/Widgets.git";
    let token = RepoIdentity::parse(url).unwrap().token();

    let m = master.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        assert_eq!(m.request(url).unwrap(), RepoStatus::Processing);
        // same repository, different spelling, while still processing
        assert_eq!(
            m.request("git@github.com:acme/widgets").unwrap(),
            RepoStatus::Processing
        );
        for _ in 0..200 {
            if m.poll_once().unwrap().persisted == 1 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    })
    .await
    .unwrap();
    assert!(persisted);

    assert_eq!(analyzer.0.load(Ordering::SeqCst), 1);
    assert_eq!(master.outstanding(), 0);

    let doc = store.get(&token).unwrap().unwrap();
    assert_eq!((doc.host.as_str(), doc.owner.as_str(), doc.name.as_str()), ("github.com", "acme", "widgets"));
    assert_eq!(doc.stat.contributors[0].email, "dev@example.com");

    let m = master.clone();
    let status = tokio::task::spawn_blocking(move || m.request(url).unwrap())
        .await
        .unwrap();
    assert_eq!(status, RepoStatus::Ready { hash: token });
    queue.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn large_result_is_persisted() {
    let (queue, base) = spawn_worker(Arc::new(Crowded)).await;
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonDirStore::new(store_dir.path()));
    let master = Arc::new(Master::new(
        store.clone(),
        Arc::new(HttpWorkerClient::new(base)),
        Duration::from_secs(60),
    ));

    let url = "https://github.com/big/monorepo";
    let token = RepoIdentity::parse(url).unwrap().token();
    let m = master.clone();
    let persisted = tokio::task::spawn_blocking(move || {
        m.request(url).unwrap();
        for _ in 0..200 {
            if m.poll_once().unwrap().persisted == 1 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    })
    .await
    .unwrap();
    assert!(persisted);

    let doc = store.get(&token).unwrap().unwrap();
    assert_eq!(doc.stat.contributors.len(), 20_000);
    let on_disk = std::fs::metadata(store_dir.path().join(format!("{token}.json"))).unwrap();
    assert!(on_disk.len() > 10 * 1024 * 1024);
    queue.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn check_reply_over_limit_is_an_error() {
    let (queue, base) = spawn_worker(Arc::new(Crowded)).await;
    let outcome = tokio::task::spawn_blocking(move || {
        let client = HttpWorkerClient::new(base).with_response_limit(64 * 1024);
        let token = client.query("https://github.com/big/monorepo").unwrap();
        while queue.ready_len() == 0 {
            std::thread::sleep(Duration::from_millis(20));
        }
        let outcome = client.check(&[token]);
        queue.close();
        outcome
    })
    .await
    .unwrap();
    assert!(matches!(outcome, Err(WorkerClientError::Request(_))));
}
