use anyhow::{Context, Result};
use git2::{ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::identity::RepoIdentity;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git {args}: {source}")]
    Spawn {
        args: String,
        source: std::io::Error,
    },
    #[error("git {args} timed out after {secs}s")]
    Timeout { args: String, secs: u64 },
    #[error("git {args} exited with {code:?}: {stderr}")]
    Failed {
        args: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error(transparent)]
    Repo(#[from] git2::Error),
}

pub struct RepoExt(pub Repository);

impl RepoExt {
    pub fn open(path: &Path) -> Result<Self> {
        Repository::discover(path)
            .with_context(|| format!("cannot open repo at {}", path.display()))
            .map(Self)
    }

    pub fn workdir(&self) -> PathBuf {
        self.0.workdir().unwrap_or(self.0.path()).to_path_buf()
    }

    /// Every blob tracked at `HEAD`, as repository-relative paths.
    /// Directories and submodules are skipped.
    pub fn list_files(&self) -> Result<Vec<String>, GitError> {
        let tree = self.0.head()?.peel_to_tree()?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{dir}{name}"));
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }

    /// Identity of the `origin` remote, when there is one that parses.
    pub fn origin_identity(&self) -> Option<RepoIdentity> {
        let remote = self.0.find_remote("origin").ok()?;
        RepoIdentity::parse(remote.url()?).ok()
    }
}

/// Run `git` with a hard deadline. Output is drained on helper threads so a
/// chatty child never blocks on a full pipe while we wait.
pub fn run_git(cwd: Option<&Path>, args: &[&str], timeout: Duration) -> Result<Output, GitError> {
    let joined = args.join(" ");
    let mut cmd = Command::new("git");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| GitError::Spawn {
        args: joined.clone(),
        source,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if start.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                warn!(args = %joined, secs = timeout.as_secs(), "git timed out");
                return Err(GitError::Timeout {
                    args: joined,
                    secs: timeout.as_secs(),
                });
            }
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(source) => {
                return Err(GitError::Spawn {
                    args: joined,
                    source,
                })
            }
        }
    };

    let output = Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    };
    if !output.status.success() {
        return Err(GitError::Failed {
            args: joined,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut p) = pipe {
            let _ = p.read_to_end(&mut buf);
        }
        buf
    })
}

static CLONE_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Clone `url` to its deterministic path below `repos_dir`, reusing an
/// existing checkout.
///
/// The clone is written to a private sibling directory and renamed into
/// place once complete, so the deterministic path only ever holds a full
/// checkout. When two clones of the same repository race, the loser drops
/// its copy and uses the winner's.
pub fn clone_repo(
    url: &str,
    identity: &RepoIdentity,
    repos_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, GitError> {
    let dst = identity.local_path(repos_dir);
    if dst.exists() {
        debug!(path = %dst.display(), "reusing existing clone");
        return Ok(dst);
    }
    let io_err = |source| GitError::Spawn {
        args: format!("clone {url}"),
        source,
    };
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = dst.with_file_name(format!(
        "{}.tmp-{}-{}",
        identity.name,
        std::process::id(),
        CLONE_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    info!(%url, path = %dst.display(), "cloning");
    let tmp_str = tmp.to_string_lossy().into_owned();
    if let Err(e) = run_git(None, &["clone", "--quiet", "--", url, tmp_str.as_str()], timeout) {
        let _ = std::fs::remove_dir_all(&tmp);
        return Err(e);
    }

    match std::fs::rename(&tmp, &dst) {
        Ok(()) => Ok(dst),
        Err(_) if dst.exists() => {
            debug!(path = %dst.display(), "lost clone race, reusing the other checkout");
            let _ = std::fs::remove_dir_all(&tmp);
            Ok(dst)
        }
        Err(source) => {
            let _ = std::fs::remove_dir_all(&tmp);
            Err(io_err(source))
        }
    }
}
