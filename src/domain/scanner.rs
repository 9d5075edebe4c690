use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::blame::{blame_file, BlameError, BlameParser};
use super::stats::{Aggregator, FileRecord, RepositoryStat};

/// Produces the record of one file. The production source runs `git blame`;
/// tests substitute canned output.
pub trait FileSource: Sync {
    fn record(&self, path: &str) -> Result<FileRecord, BlameError>;
}

/// `git blame` against a checkout.
pub struct GitBlameSource {
    repo_dir: PathBuf,
    parser: BlameParser,
    timeout: Duration,
}

impl GitBlameSource {
    pub fn new(repo_dir: &Path, parser: BlameParser, timeout: Duration) -> Self {
        GitBlameSource {
            repo_dir: repo_dir.to_path_buf(),
            parser,
            timeout,
        }
    }
}

impl FileSource for GitBlameSource {
    fn record(&self, path: &str) -> Result<FileRecord, BlameError> {
        blame_file(&self.repo_dir, path, &self.parser, self.timeout)
    }
}

/// Fans files out over a bounded pool and merges results under one lock.
pub struct FileScanner {
    threads: usize,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(0)
    }
}

impl FileScanner {
    /// `threads == 0` means one worker per available core.
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            threads
        };
        FileScanner { threads }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Scan every file; a failing file is logged and skipped. Returns once
    /// all files have finished.
    pub fn scan<S: FileSource>(&self, source: &S, files: &[String]) -> RepositoryStat {
        let acc = Mutex::new(Aggregator::new());
        let work = || {
            files.par_iter().for_each(|file| {
                let outcome = source.record(file);
                let mut agg = acc.lock().unwrap_or_else(PoisonError::into_inner);
                match outcome {
                    Ok(rec) if rec.is_empty() => debug!(%file, "empty file"),
                    Ok(rec) => agg.merge(&rec),
                    Err(e) => {
                        warn!(%file, error = %e, timed_out = e.is_timeout(), "skipping file");
                        agg.record_failure();
                    }
                }
            })
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.threads).build() {
            Ok(pool) => pool.install(work),
            Err(e) => {
                warn!(error = %e, "cannot build scan pool, using the global one");
                work()
            }
        }

        let stat = acc.into_inner().unwrap_or_else(PoisonError::into_inner).finish();
        info!(
            files = files.len(),
            scanned = stat.files_scanned,
            failed = stat.files_failed,
            contributors = stat.contributors.len(),
            "scan finished"
        );
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classify::{FileKind, LineTarget};
    use crate::domain::git::GitError;
    use crate::domain::stats::{track_commit, CommitRef};
    use proptest::prelude::*;
    use std::collections::HashMap;

    /// path -> (email, target, days)
    struct Canned(HashMap<String, Vec<(String, LineTarget, i64)>>);

    impl FileSource for Canned {
        fn record(&self, path: &str) -> Result<FileRecord, BlameError> {
            let rows = self.0.get(path).ok_or_else(|| BlameError::BadHistoryOutput {
                path: path.to_string(),
            })?;
            let mut r = FileRecord::new(path, FileKind::of_path(path));
            for (email, target, days) in rows {
                let fc = r.users.entry(email.clone()).or_default();
                fc.lines.bucket_mut(*target).record(*days);
                track_commit(
                    &mut fc.commit,
                    &CommitRef {
                        id: format!("c{days}"),
                        days: *days,
                    },
                );
                r.total_lines += 1;
            }
            Ok(r)
        }
    }

    fn canned(files: Vec<(&str, Vec<(&str, LineTarget, i64)>)>) -> Canned {
        Canned(
            files
                .into_iter()
                .map(|(p, rows)| {
                    (
                        p.to_string(),
                        rows.into_iter().map(|(e, t, d)| (e.to_string(), t, d)).collect(),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn failing_file_is_skipped() {
        use LineTarget::*;
        let src = canned(vec![("a.rs", vec![("a@x", Code, 1)]), ("empty.rs", vec![])]);
        let files = vec!["a.rs".to_string(), "missing.rs".to_string(), "empty.rs".to_string()];
        let stat = FileScanner::new(4).scan(&src, &files);
        assert_eq!(stat.files_scanned, 1);
        assert_eq!(stat.files_failed, 1);
        assert_eq!(stat.lines.code.total, 1);
    }

    /// Every file hangs past its deadline.
    struct Hung;

    impl FileSource for Hung {
        fn record(&self, path: &str) -> Result<FileRecord, BlameError> {
            Err(BlameError::Invocation {
                path: path.to_string(),
                source: GitError::Timeout {
                    args: format!("blame -- {path}"),
                    secs: 1,
                },
            })
        }
    }

    #[test]
    fn timed_out_file_counts_as_failed() {
        let err = Hung.record("slow.rs").unwrap_err();
        assert!(err.is_timeout());

        let files = vec!["slow.rs".to_string(), "slower.rs".to_string()];
        let stat = FileScanner::new(2).scan(&Hung, &files);
        assert_eq!(stat.files_failed, 2);
        assert_eq!(stat.files_scanned, 0);
        assert!(stat.contributors.is_empty());
    }

    #[test]
    fn zero_threads_means_hardware_parallelism() {
        assert!(FileScanner::new(0).threads() >= 1);
        assert_eq!(FileScanner::new(3).threads(), 3);
    }

    fn arb_files() -> impl Strategy<Value = Vec<(String, Vec<(String, LineTarget, i64)>)>> {
        let target = prop_oneof![
            Just(LineTarget::Code),
            Just(LineTarget::Docs),
            Just(LineTarget::Tests),
            Just(LineTarget::Resources),
        ];
        let row = ("[abc]@x", target, 0i64..500);
        prop::collection::vec(prop::collection::vec(row, 0..20), 1..25).prop_map(|files| {
            files
                .into_iter()
                .enumerate()
                .map(|(i, rows)| (format!("f{i}.{}", ["rs", "md", "go"][i % 3]), rows))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn aggregate_is_independent_of_parallelism(files in arb_files()) {
            let names: Vec<String> = files.iter().map(|(p, _)| p.clone()).collect();
            let src = Canned(files.into_iter().collect());
            let serial = FileScanner::new(1).scan(&src, &names);
            let parallel = FileScanner::new(8).scan(&src, &names);
            let mut reversed_names = names.clone();
            reversed_names.reverse();
            let reversed = FileScanner::new(3).scan(&src, &reversed_names);
            prop_assert_eq!(&serial, &parallel);
            prop_assert_eq!(&serial, &reversed);
        }
    }
}
