use regex::Regex;
use std::path::Path;
use thiserror::Error;

/// The built-in vendor/noise pattern list.
pub const DEFAULT_PATTERNS: &str = include_str!("vendor_patterns.txt");

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid exclude pattern: {0}")]
    Invalid(#[from] regex::Error),
    #[error("cannot read pattern file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Excludes vendored and generated paths before they reach `git blame`.
///
/// All patterns are compiled into a single alternation.
#[derive(Debug, Clone)]
pub struct PathFilter {
    re: Option<Regex>,
    version: Option<String>,
    count: usize,
}

impl PathFilter {
    /// Built-in list plus `extra` patterns.
    pub fn with_defaults(extra: &[String]) -> Result<Self, PatternError> {
        let mut patterns = parse_patterns(DEFAULT_PATTERNS);
        patterns.extend(extra.iter().cloned());
        Self::compile(patterns, pattern_version(DEFAULT_PATTERNS))
    }

    /// Pattern list read from a file in the same format as the built-in one.
    pub fn from_file(path: &Path, extra: &[String]) -> Result<Self, PatternError> {
        let text = std::fs::read_to_string(path).map_err(|source| PatternError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut patterns = parse_patterns(&text);
        patterns.extend(extra.iter().cloned());
        Self::compile(patterns, pattern_version(&text))
    }

    pub fn compile(patterns: Vec<String>, version: Option<String>) -> Result<Self, PatternError> {
        let count = patterns.len();
        let re = if patterns.is_empty() {
            None
        } else {
            Some(Regex::new(&patterns.join("|"))?)
        };
        Ok(PathFilter { re, version, count })
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.re.as_ref().is_some_and(|re| re.is_match(path))
    }

    pub fn retain(&self, files: Vec<String>) -> Vec<String> {
        files.into_iter().filter(|f| !self.is_excluded(f)).collect()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

fn parse_patterns(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| format!("(?:{l})"))
        .collect()
}

fn pattern_version(text: &str) -> Option<String> {
    text.lines()
        .find_map(|l| l.trim().strip_prefix("# version:"))
        .map(|v| v.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> PathFilter {
        PathFilter::with_defaults(&[]).expect("built-in patterns compile")
    }

    #[test]
    fn builtin_list_compiles_and_is_versioned() {
        let f = filter();
        assert!(f.len() > 100);
        assert_eq!(f.version(), Some("1"));
    }

    #[test]
    fn excludes_noise() {
        let f = filter();
        for p in [
            "node_modules/left-pad/index.js",
            "static/js/app.min.js",
            "vendor/github.com/pkg/errors/errors.go",
            "web/jquery-3.1.1.js",
            "types/index.d.ts",
            "Cargo.lock",
            "frontend/package-lock.json",
            ".gitignore",
            "third_party/zlib/inflate.c",
            "gradle/wrapper/gradle-wrapper.properties",
        ] {
            assert!(f.is_excluded(p), "{p} should be excluded");
        }
    }

    #[test]
    fn keeps_sources() {
        let f = filter();
        for p in ["src/main.rs", "cmd/server/main.go", "README.md", "lib/app.js", "docs/guide.md"] {
            assert!(!f.is_excluded(p), "{p} should be kept");
        }
    }

    #[test]
    fn extra_patterns_extend_the_list() {
        let f = PathFilter::with_defaults(&["^generated/".to_string()]).unwrap();
        assert!(f.is_excluded("generated/api.rs"));
        assert!(!filter().is_excluded("generated/api.rs"));
    }

    #[test]
    fn empty_list_excludes_nothing() {
        let f = PathFilter::compile(Vec::new(), None).unwrap();
        assert!(!f.is_excluded("node_modules/x.js"));
        assert!(f.is_empty());
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(PathFilter::with_defaults(&["(".to_string()]).is_err());
    }

    #[test]
    fn pattern_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("patterns.txt");
        std::fs::write(&p, "# version: 7\n# comment\n\n^build/\n").unwrap();
        let f = PathFilter::from_file(&p, &[]).unwrap();
        assert_eq!(f.version(), Some("7"));
        assert_eq!(f.len(), 1);
        assert!(f.is_excluded("build/out.o"));
    }
}
