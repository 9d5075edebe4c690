use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::stats::RepositoryStat;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Request(String),
    #[error("identity api error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("commit {0} has no linked account")]
    Unlinked(String),
}

/// Maps a commit to the display name of its author.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, owner: &str, repo: &str, commit: &str) -> Result<String, IdentityError>;
}

/// Resolves nothing; every contributor keeps an empty name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl IdentityResolver for NoResolver {
    fn resolve(&self, _owner: &str, _repo: &str, commit: &str) -> Result<String, IdentityError> {
        Err(IdentityError::Unlinked(commit.to_string()))
    }
}

/// GitHub commits API, `author.login` of the commit.
pub struct GithubResolver {
    api_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    author: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    login: String,
}

impl GithubResolver {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(15)))
            .build()
            .new_agent();
        GithubResolver {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            agent,
        }
    }
}

impl IdentityResolver for GithubResolver {
    fn resolve(&self, owner: &str, repo: &str, commit: &str) -> Result<String, IdentityError> {
        let url = format!("{}/repos/{owner}/{repo}/commits/{commit}", self.api_url);
        let mut req = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "repocity");
        if let Some(token) = &self.token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }

        let response = req
            .call()
            .map_err(|e| IdentityError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.into_body().read_to_string().unwrap_or_default();
            return Err(IdentityError::Api { status, message });
        }

        let body: CommitResponse = response
            .into_body()
            .read_json()
            .map_err(|e| IdentityError::Request(e.to_string()))?;
        body.author
            .map(|a| a.login)
            .ok_or_else(|| IdentityError::Unlinked(commit.to_string()))
    }
}

/// Fill in display names of the first `top` ranked contributors. Failures
/// leave the name empty and never abort.
pub fn resolve_top(
    stat: &mut RepositoryStat,
    resolver: &dyn IdentityResolver,
    owner: &str,
    repo: &str,
    top: usize,
) -> usize {
    let mut resolved = 0;
    for c in stat.contributors.iter_mut().take(top) {
        let Some(commit) = c.commit_id.as_deref() else {
            continue;
        };
        match resolver.resolve(owner, repo, commit) {
            Ok(name) => {
                debug!(email = %c.email, %name, "resolved contributor");
                c.username = Some(name);
                resolved += 1;
            }
            Err(e) => warn!(email = %c.email, error = %e, "cannot resolve contributor"),
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stats::Contributor;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<String>>,
        fail_on: &'static str,
    }

    impl IdentityResolver for Recording {
        fn resolve(&self, owner: &str, repo: &str, commit: &str) -> Result<String, IdentityError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{owner}/{repo}@{commit}"));
            if commit == self.fail_on {
                return Err(IdentityError::Api {
                    status: 404,
                    message: "nope".into(),
                });
            }
            Ok(format!("user-{commit}"))
        }
    }

    fn stat(n: usize) -> RepositoryStat {
        RepositoryStat {
            contributors: (0..n)
                .map(|i| Contributor {
                    email: format!("u{i}@x"),
                    commit_id: Some(format!("c{i}")),
                    commit_days: Some(i as i64),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn only_top_n_are_resolved() {
        let r = Recording {
            calls: Mutex::new(Vec::new()),
            fail_on: "",
        };
        let mut s = stat(20);
        let n = resolve_top(&mut s, &r, "acme", "repo", 15);
        assert_eq!(n, 15);
        assert_eq!(r.calls.lock().unwrap().len(), 15);
        assert_eq!(r.calls.lock().unwrap()[0], "acme/repo@c0");
        assert_eq!(s.contributors[14].username.as_deref(), Some("user-c14"));
        assert_eq!(s.contributors[15].username, None);
    }

    #[test]
    fn failures_leave_name_empty() {
        let r = Recording {
            calls: Mutex::new(Vec::new()),
            fail_on: "c1",
        };
        let mut s = stat(3);
        assert_eq!(resolve_top(&mut s, &r, "o", "r", 15), 2);
        assert_eq!(s.contributors[1].username, None);
        assert_eq!(s.contributors[2].username.as_deref(), Some("user-c2"));
    }

    #[test]
    fn no_resolver_resolves_nothing() {
        let mut s = stat(2);
        assert_eq!(resolve_top(&mut s, &NoResolver, "o", "r", 15), 0);
    }
}
