use chrono::{DateTime, Utc};
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use super::classify::{looks_binary, FileKind, LineClassifier};
use super::git::{run_git, GitError};
use super::stats::{track_commit, CommitRef, FileRecord};

/// `git blame` flags: ignore whitespace, detect moves and copies, full hashes,
/// emails instead of names.
pub const BLAME_ARGS: &[&str] = &["blame", "-w", "-M", "-l", "-C", "-e", "--"];

const SECS_PER_DAY: i64 = 60 * 60 * 24;

#[derive(Debug, Error)]
pub enum BlameError {
    #[error("git blame failed for {path}: {source}")]
    Invocation { path: String, source: GitError },
    #[error("bad git-blame output for {path}")]
    BadHistoryOutput { path: String },
    #[error("cannot parse blame record {line} of {path}: {record:?}")]
    HeaderParse {
        path: String,
        line: usize,
        record: String,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl BlameError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BlameError::Invocation {
                source: GitError::Timeout { .. },
                ..
            }
        )
    }
}

fn header_re() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        // <^?hash> [<orig path>] (<<email>> <date> <tz> <lineno>) <text>
        Regex::new(
            r"^\^?([0-9a-f]{39,64}) (?:(.*?) +)?\(<([^>]*)> +(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} [+-]\d{4}) +(\d+)\) ?(.*)$",
        )
        .expect("valid regex")
    })
}

/// One parsed `git blame` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameRecord<'a> {
    pub commit: &'a str,
    pub orig_path: Option<&'a str>,
    pub email: &'a str,
    pub time: DateTime<chrono::FixedOffset>,
    pub line_no: u64,
    pub text: &'a str,
}

pub fn parse_record(line: &str) -> Option<BlameRecord<'_>> {
    let caps = header_re().captures(line)?;
    let time = DateTime::parse_from_str(caps.get(4)?.as_str(), "%Y-%m-%d %H:%M:%S %z").ok()?;
    Some(BlameRecord {
        commit: caps.get(1)?.as_str(),
        orig_path: caps.get(2).map(|m| m.as_str()).filter(|s| !s.is_empty()),
        email: caps.get(3)?.as_str(),
        time,
        line_no: caps.get(5)?.as_str().parse().ok()?,
        text: caps.get(6).map_or("", |m| m.as_str()),
    })
}

/// Turns `git blame` output of one file into a [`FileRecord`].
#[derive(Debug, Clone, Copy)]
pub struct BlameParser {
    now: DateTime<Utc>,
}

impl Default for BlameParser {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl BlameParser {
    /// Ages are measured against `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        BlameParser { now }
    }

    pub fn days_after(&self, time: DateTime<chrono::FixedOffset>) -> i64 {
        (self.now.timestamp() - time.timestamp()).div_euclid(SECS_PER_DAY)
    }

    /// `file_size` is the size of the file on disk and only matters when the
    /// output is empty: an empty file is fine, anything else is an error.
    pub fn parse(
        &self,
        path: &str,
        kind: FileKind,
        output: &str,
        file_size: u64,
    ) -> Result<FileRecord, BlameError> {
        let mut record = FileRecord::new(path, kind);
        if output.is_empty() {
            if file_size == 0 {
                return Ok(record);
            }
            return Err(BlameError::BadHistoryOutput {
                path: path.to_string(),
            });
        }

        let mut classifier = LineClassifier::new(kind);
        for (idx, line) in output.lines().enumerate() {
            let rec = parse_record(line).ok_or_else(|| BlameError::HeaderParse {
                path: path.to_string(),
                line: idx + 1,
                record: line.chars().take(200).collect(),
            })?;

            let days = self.days_after(rec.time);
            let user = record.users.entry(rec.email.to_string()).or_default();
            track_commit(
                &mut user.commit,
                &CommitRef {
                    id: rec.commit.to_string(),
                    days,
                },
            );
            let target = classifier.classify(rec.text);
            user.lines.bucket_mut(target).record(days);
            record.total_lines += 1;
        }
        Ok(record)
    }
}

/// Blame `path` inside `repo_dir` and parse the result.
pub fn blame_file(
    repo_dir: &Path,
    path: &str,
    parser: &BlameParser,
    timeout: Duration,
) -> Result<FileRecord, BlameError> {
    let full = repo_dir.join(path);
    let io_err = |source| BlameError::Io {
        path: path.to_string(),
        source,
    };
    let file_size = std::fs::metadata(&full).map_err(io_err)?.len();

    let mut kind = FileKind::of_path(path);
    if file_size > 0 {
        let mut head = Vec::with_capacity(8000);
        File::open(&full)
            .and_then(|f| f.take(8000).read_to_end(&mut head))
            .map_err(io_err)?;
        if looks_binary(&head) {
            kind = kind.binary();
        }
    }

    let mut args = BLAME_ARGS.to_vec();
    args.push(path);
    let out = run_git(Some(repo_dir), &args, timeout).map_err(|source| BlameError::Invocation {
        path: path.to_string(),
        source,
    })?;

    parser.parse(path, kind, &String::from_utf8_lossy(&out.stdout), file_size)
}
