//! Runtime configuration.
//!
//! Sources, lowest priority first:
//! - built-in defaults
//! - `~/.config/repocity/config.toml` (or an explicit `--config` file)
//! - `REPOCITY_*` environment variables
//! - command-line flags (applied by the commands themselves)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Where repositories are cloned, `<repos_dir>/<host>/<owner>/<name>`.
    pub repos_dir: PathBuf,
    /// Blame workers per scan, 0 = one per core.
    pub threads: usize,
    pub blame_timeout_secs: u64,
    pub clone_timeout_secs: u64,
    /// How many ranked contributors get a display name.
    pub top_contributors: usize,

    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Resolve display names through the GitHub API.
    pub resolve_names: bool,

    /// Replaces the built-in vendor pattern list.
    pub exclude_patterns_file: Option<PathBuf>,
    pub extra_exclude_patterns: Vec<String>,

    pub queue_capacity: usize,
    pub result_cache_capacity: usize,
    /// 0 keeps results for the life of the worker.
    pub result_ttl_secs: u64,

    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    /// Tokens per `/check` call.
    pub check_batch: usize,
    /// Largest `/check` reply the master reads.
    pub worker_response_limit_mb: u64,
    pub store_dir: PathBuf,
    pub worker_url: String,
    pub worker_listen: String,
    pub master_listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            repos_dir: PathBuf::from("/tmp/repos"),
            threads: 0,
            blame_timeout_secs: 60,
            clone_timeout_secs: 600,
            top_contributors: 15,
            github_token: None,
            github_api_url: "https://api.github.com".to_string(),
            resolve_names: true,
            exclude_patterns_file: None,
            extra_exclude_patterns: Vec::new(),
            queue_capacity: 1024,
            result_cache_capacity: 256,
            result_ttl_secs: 24 * 60 * 60,
            poll_interval_secs: 5,
            max_wait_secs: 60 * 60,
            check_batch: 16,
            worker_response_limit_mb: 512,
            store_dir: std::env::temp_dir().join("repocity-store"),
            worker_url: "http://127.0.0.1:7777".to_string(),
            worker_listen: "0.0.0.0:7777".to_string(),
            master_listen: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then the config file, then the environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::user_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            },
        };
        config.apply_env(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("repocity").join("config.toml"))
    }

    /// Environment overrides, `REPOCITY_<KEY>` for every key. Lists are
    /// comma-separated. `GITHUB_TOKEN` is honoured too.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn num<T: std::str::FromStr>(key: &str, v: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            v.trim()
                .parse()
                .with_context(|| format!("{key} must be a number, got {v:?}"))
        }

        if let Some(v) = var("REPOCITY_REPOS_DIR") {
            self.repos_dir = PathBuf::from(v);
        }
        if let Some(v) = var("REPOCITY_THREADS") {
            self.threads = num("REPOCITY_THREADS", v)?;
        }
        if let Some(v) = var("REPOCITY_BLAME_TIMEOUT_SECS") {
            self.blame_timeout_secs = num("REPOCITY_BLAME_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = var("REPOCITY_CLONE_TIMEOUT_SECS") {
            self.clone_timeout_secs = num("REPOCITY_CLONE_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = var("REPOCITY_TOP_CONTRIBUTORS") {
            self.top_contributors = num("REPOCITY_TOP_CONTRIBUTORS", v)?;
        }
        if let Some(v) = var("GITHUB_TOKEN") {
            self.github_token = Some(v);
        }
        if let Some(v) = var("REPOCITY_GITHUB_TOKEN") {
            self.github_token = Some(v);
        }
        if let Some(v) = var("REPOCITY_GITHUB_API_URL") {
            self.github_api_url = v;
        }
        if let Some(v) = var("REPOCITY_RESOLVE_NAMES") {
            self.resolve_names = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => bail!("REPOCITY_RESOLVE_NAMES must be a boolean, got {v:?}"),
            };
        }
        if let Some(v) = var("REPOCITY_EXCLUDE_PATTERNS_FILE") {
            self.exclude_patterns_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("REPOCITY_EXTRA_EXCLUDE_PATTERNS") {
            self.extra_exclude_patterns = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("REPOCITY_QUEUE_CAPACITY") {
            self.queue_capacity = num("REPOCITY_QUEUE_CAPACITY", v)?;
        }
        if let Some(v) = var("REPOCITY_RESULT_CACHE_CAPACITY") {
            self.result_cache_capacity = num("REPOCITY_RESULT_CACHE_CAPACITY", v)?;
        }
        if let Some(v) = var("REPOCITY_RESULT_TTL_SECS") {
            self.result_ttl_secs = num("REPOCITY_RESULT_TTL_SECS", v)?;
        }
        if let Some(v) = var("REPOCITY_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = num("REPOCITY_POLL_INTERVAL_SECS", v)?;
        }
        if let Some(v) = var("REPOCITY_MAX_WAIT_SECS") {
            self.max_wait_secs = num("REPOCITY_MAX_WAIT_SECS", v)?;
        }
        if let Some(v) = var("REPOCITY_CHECK_BATCH") {
            self.check_batch = num("REPOCITY_CHECK_BATCH", v)?;
        }
        if let Some(v) = var("REPOCITY_WORKER_RESPONSE_LIMIT_MB") {
            self.worker_response_limit_mb = num("REPOCITY_WORKER_RESPONSE_LIMIT_MB", v)?;
        }
        if let Some(v) = var("REPOCITY_STORE_DIR") {
            self.store_dir = PathBuf::from(v);
        }
        if let Some(v) = var("REPOCITY_WORKER_URL") {
            self.worker_url = v;
        }
        if let Some(v) = var("REPOCITY_WORKER_LISTEN") {
            self.worker_listen = v;
        }
        if let Some(v) = var("REPOCITY_MASTER_LISTEN") {
            self.master_listen = v;
        }
        Ok(())
    }

    pub fn blame_timeout(&self) -> Duration {
        Duration::from_secs(self.blame_timeout_secs.max(1))
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn worker_response_limit(&self) -> u64 {
        self.worker_response_limit_mb.max(1) * 1024 * 1024
    }

    pub fn result_ttl(&self) -> Option<Duration> {
        (self.result_ttl_secs > 0).then(|| Duration::from_secs(self.result_ttl_secs))
    }
}
