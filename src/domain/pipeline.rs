use git2::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use super::blame::BlameParser;
use super::git::{clone_repo, GitError, RepoExt};
use super::identity::{RepoIdentity, UrlError};
use super::path_filter::{PathFilter, PatternError};
use super::resolver::{resolve_top, GithubResolver, IdentityResolver, NoResolver};
use super::scanner::{FileScanner, GitBlameSource};
use super::stats::RepositoryStat;
use crate::config::Config;

/// Errors that abort the analysis of a whole repository.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),
    #[error("cannot clone {url}: {source}")]
    Clone { url: String, source: GitError },
    #[error("cannot list files of {path}: {source}")]
    FileList { path: String, source: GitError },
}

/// Whole-repository analysis: clone, list, filter, blame, aggregate,
/// resolve names.
pub struct Pipeline {
    repos_dir: PathBuf,
    clone_timeout: Duration,
    blame_timeout: Duration,
    top_contributors: usize,
    scanner: FileScanner,
    filter: PathFilter,
    resolver: Arc<dyn IdentityResolver>,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        filter: PathFilter,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Pipeline {
            repos_dir: config.repos_dir.clone(),
            clone_timeout: config.clone_timeout(),
            blame_timeout: config.blame_timeout(),
            top_contributors: config.top_contributors,
            scanner: FileScanner::new(config.threads),
            filter,
            resolver,
        }
    }

    /// Pattern list and resolver as described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, PatternError> {
        let filter = match &config.exclude_patterns_file {
            Some(path) => PathFilter::from_file(path, &config.extra_exclude_patterns)?,
            None => PathFilter::with_defaults(&config.extra_exclude_patterns)?,
        };
        let resolver: Arc<dyn IdentityResolver> = if config.resolve_names {
            Arc::new(GithubResolver::new(
                config.github_api_url.clone(),
                config.github_token.clone(),
            ))
        } else {
            Arc::new(NoResolver)
        };
        Ok(Self::new(config, filter, resolver))
    }

    /// Clone (or reuse) and analyse the repository behind `url`.
    pub fn analyze_url(&self, url: &str) -> Result<RepositoryStat, ScanError> {
        let identity = RepoIdentity::parse(url)?;
        let dir = clone_repo(url, &identity, &self.repos_dir, self.clone_timeout).map_err(
            |source| ScanError::Clone {
                url: url.to_string(),
                source,
            },
        )?;
        self.analyze_checkout(&dir, Some(&identity))
    }

    /// Analyse an existing checkout. Names are only resolved when the
    /// repository identity is known.
    pub fn analyze_checkout(
        &self,
        dir: &Path,
        identity: Option<&RepoIdentity>,
    ) -> Result<RepositoryStat, ScanError> {
        let started = Instant::now();
        let list_err = |source| ScanError::FileList {
            path: dir.display().to_string(),
            source,
        };
        let repo = Repository::discover(dir)
            .map_err(|e| list_err(GitError::Repo(e)))
            .map(RepoExt)?;
        let workdir = repo.workdir();
        let all = repo.list_files().map_err(list_err)?;
        let total = all.len();
        let files = self.filter.retain(all);
        info!(
            repo = %workdir.display(),
            tracked = total,
            excluded = total - files.len(),
            patterns = self.filter.len(),
            patterns_version = self.filter.version().unwrap_or("-"),
            threads = self.scanner.threads(),
            "scanning"
        );

        let source = GitBlameSource::new(&workdir, BlameParser::default(), self.blame_timeout);
        let mut stat = self.scanner.scan(&source, &files);

        match identity {
            Some(id) => {
                resolve_top(
                    &mut stat,
                    self.resolver.as_ref(),
                    &id.owner,
                    &id.name,
                    self.top_contributors,
                );
            }
            None => warn!("unknown repository identity, display names not resolved"),
        }

        info!(
            repo = %workdir.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            lines = stat.total_lines(),
            "analysis finished"
        );
        Ok(stat)
    }
}
