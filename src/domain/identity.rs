use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot parse repository url {url:?}: {reason}")]
pub struct UrlError {
    pub url: String,
    pub reason: &'static str,
}

/// Deduplication token: hex MD5 of the normalised `host/owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoToken(String);

impl RepoToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts anything that looks like a token, for wire input.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        (s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| RepoToken(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for RepoToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalised `(host, owner, name)` triple of a repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoIdentity {
    /// Accepts `scheme://[user@]host[:port]/owner/name[.git][/]` and the
    /// scp-like `[user@]host:owner/name[.git]`.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let err = |reason| UrlError {
            url: url.to_string(),
            reason,
        };
        let raw = url.trim();
        if raw.is_empty() {
            return Err(err("empty url"));
        }

        let (authority, path) = if let Some(idx) = raw.find("://") {
            let rest = &raw[idx + 3..];
            let slash = rest.find('/').ok_or_else(|| err("missing path"))?;
            let authority = &rest[..slash];
            let host = authority.rsplit('@').next().unwrap_or(authority);
            // drop the port
            let host = host.split(':').next().unwrap_or(host);
            (host, &rest[slash + 1..])
        } else {
            let colon = raw.find(':').ok_or_else(|| err("missing ':' or scheme"))?;
            let authority = &raw[..colon];
            let host = authority.rsplit('@').next().unwrap_or(authority);
            (host, &raw[colon + 1..])
        };

        let segments: Vec<&str> = path
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(err("expected owner/name"));
        }
        let owner = segments[segments.len() - 2].to_ascii_lowercase();
        let name = segments[segments.len() - 1].to_ascii_lowercase();
        let name = name.strip_suffix(".git").unwrap_or(&name).to_string();
        let host = authority.to_ascii_lowercase();

        if host.is_empty() || owner.is_empty() || name.is_empty() {
            return Err(err("empty host, owner or name"));
        }
        if [&host, &owner, &name].iter().any(|s| *s == "." || *s == "..") {
            return Err(err("path traversal"));
        }

        Ok(RepoIdentity { host, owner, name })
    }

    pub fn token(&self) -> RepoToken {
        let key = format!("{}/{}/{}", self.host, self.owner, self.name);
        RepoToken(format!("{:x}", md5::compute(key.as_bytes())))
    }

    /// Deterministic clone destination below `repos_dir`.
    pub fn local_path(&self, repos_dir: &Path) -> PathBuf {
        repos_dir.join(&self.host).join(&self.owner).join(&self.name)
    }
}

impl fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(host: &str, owner: &str, name: &str) -> RepoIdentity {
        RepoIdentity {
            host: host.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    #[test]
    fn https_and_scp_forms_agree() {
        let a = RepoIdentity::parse("https://github.com/Acme/Repo.git").unwrap();
        let b = RepoIdentity::parse("git@github.com:acme/repo").unwrap();
        assert_eq!(a, id("github.com", "acme", "repo"));
        assert_eq!(a, b);
        assert_eq!(a.token(), b.token());
    }

    #[test]
    fn other_forms() {
        let want = id("gitlab.com", "group", "proj");
        for url in [
            "https://gitlab.com/group/proj/",
            "http://user@GitLab.com:8443/Group/Proj.git",
            "ssh://git@gitlab.com/group/proj.git",
            "gitlab.com:group/proj",
            "https://gitlab.com/group/proj?tab=readme",
        ] {
            assert_eq!(RepoIdentity::parse(url).unwrap(), want, "{url}");
        }
    }

    #[test]
    fn nested_groups_use_last_two_segments() {
        let i = RepoIdentity::parse("https://gitlab.com/a/b/c.git").unwrap();
        assert_eq!(i, id("gitlab.com", "b", "c"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(RepoIdentity::parse("").is_err());
        assert!(RepoIdentity::parse("not a url").is_err());
        assert!(RepoIdentity::parse("https://github.com/only").is_err());
        assert!(RepoIdentity::parse("https://github.com/../x").is_err());
    }

    #[test]
    fn token_is_md5_hex() {
        let t = id("github.com", "acme", "repo").token();
        assert_eq!(t.as_str().len(), 32);
        assert_eq!(RepoToken::parse(t.as_str()), Some(t.clone()));
        assert_eq!(RepoToken::parse("xyz"), None);
        assert_eq!(t.as_str(), format!("{:x}", md5::compute(b"github.com/acme/repo")));
    }

    #[test]
    fn local_path_layout() {
        let p = id("github.com", "acme", "repo").local_path(Path::new("/tmp/repos"));
        assert_eq!(p, PathBuf::from("/tmp/repos/github.com/acme/repo"));
    }

    proptest! {
        #[test]
        fn token_ignores_case_and_git_suffix(
            owner in "[a-zA-Z][a-zA-Z0-9_-]{0,12}",
            name in "[a-zA-Z][a-zA-Z0-9_-]{0,12}",
        ) {
            let https = format!("https://GitHub.com/{owner}/{name}.git");
            let scp = format!("git@github.com:{}/{}", owner.to_lowercase(), name.to_uppercase());
            let a = RepoIdentity::parse(&https).unwrap();
            let b = RepoIdentity::parse(&scp).unwrap();
            prop_assert_eq!(a.token(), b.token());
        }
    }
}
