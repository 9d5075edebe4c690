use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::classify::{extension, FileKind, LineTarget};
use super::recency::RecencyStat;

/// Line counts of one contributor split by bucket category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub code: RecencyStat,
    pub docs: RecencyStat,
    pub tests: RecencyStat,
    pub resources: RecencyStat,
}

impl Contribution {
    pub fn bucket_mut(&mut self, target: LineTarget) -> &mut RecencyStat {
        match target {
            LineTarget::Code => &mut self.code,
            LineTarget::Docs => &mut self.docs,
            LineTarget::Tests => &mut self.tests,
            LineTarget::Resources => &mut self.resources,
        }
    }

    pub fn append(&mut self, other: &Contribution) {
        self.code.append(&other.code);
        self.docs.append(&other.docs);
        self.tests.append(&other.tests);
        self.resources.append(&other.resources);
    }

    /// All four categories folded into one.
    pub fn combined(&self) -> RecencyStat {
        self.code + self.docs + self.tests + self.resources
    }

    pub fn total_lines(&self) -> u64 {
        self.combined().total
    }
}

/// A commit and its age in days at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: String,
    pub days: i64,
}

impl CommitRef {
    /// The tracked reference commit is the most recent one: fewer days wins,
    /// equal ages fall back to the smaller commit id so the choice does not
    /// depend on merge order.
    pub fn is_newer_than(&self, other: &CommitRef) -> bool {
        match self.days.cmp(&other.days) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.id < other.id,
        }
    }
}

/// Replace `slot` when `candidate` is the more recent commit.
pub fn track_commit(slot: &mut Option<CommitRef>, candidate: &CommitRef) {
    let replace = match slot {
        None => true,
        Some(current) => candidate.is_newer_than(current),
    };
    if replace {
        *slot = Some(candidate.clone());
    }
}

/// One contributor's share of a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContributor {
    #[serde(flatten)]
    pub lines: Contribution,
    pub commit: Option<CommitRef>,
}

/// Attribution of every line of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub is_doc: bool,
    pub is_test: bool,
    pub is_binary: bool,
    pub total_lines: u64,
    pub users: BTreeMap<String, FileContributor>,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        FileRecord {
            path: path.into(),
            is_doc: kind.is_doc,
            is_test: kind.is_test,
            is_binary: kind.is_binary,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_lines == 0
    }

    /// Lowercased extension, `""` when there is none.
    pub fn extension(&self) -> String {
        extension(&self.path).unwrap_or_default()
    }
}

/// Repository-wide statistics of one committer identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub email: String,
    #[serde(flatten)]
    pub lines: Contribution,
    pub per_extension: BTreeMap<String, RecencyStat>,
    pub commit_id: Option<String>,
    pub commit_days: Option<i64>,
    pub username: Option<String>,
}

impl Contributor {
    pub fn total_lines(&self) -> u64 {
        self.lines.total_lines()
    }
}

/// Aggregated statistics of a whole repository, contributors ranked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStat {
    #[serde(flatten)]
    pub lines: Contribution,
    pub contributors: Vec<Contributor>,
    pub files_scanned: u64,
    pub files_failed: u64,
}

impl RepositoryStat {
    pub fn total_lines(&self) -> u64 {
        self.lines.total_lines()
    }

    pub fn contributor(&self, email: &str) -> Option<&Contributor> {
        self.contributors.iter().find(|c| c.email == email)
    }
}

/// Folds per-file records into repository totals.
///
/// Merging is commutative, so records may arrive in any order.
#[derive(Debug, Default)]
pub struct Aggregator {
    lines: Contribution,
    users: HashMap<String, Contributor>,
    commits: HashMap<String, Option<CommitRef>>,
    files_scanned: u64,
    files_failed: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, record: &FileRecord) {
        self.files_scanned += 1;
        let ext = record.extension();

        for (email, fc) in &record.users {
            self.lines.append(&fc.lines);

            let user = self
                .users
                .entry(email.clone())
                .or_insert_with(|| Contributor {
                    email: email.clone(),
                    ..Default::default()
                });
            user.lines.append(&fc.lines);
            user.per_extension
                .entry(ext.clone())
                .or_default()
                .append(&fc.lines.combined());

            if let Some(commit) = &fc.commit {
                track_commit(self.commits.entry(email.clone()).or_default(), commit);
            }
        }
    }

    pub fn record_failure(&mut self) {
        self.files_failed += 1;
    }

    /// Contributors sorted by combined line count, descending.
    pub fn finish(self) -> RepositoryStat {
        let Aggregator {
            lines,
            users,
            mut commits,
            files_scanned,
            files_failed,
        } = self;

        let mut contributors: Vec<Contributor> = users
            .into_values()
            .map(|mut c| {
                if let Some(Some(commit)) = commits.remove(&c.email) {
                    c.commit_id = Some(commit.id);
                    c.commit_days = Some(commit.days);
                }
                c
            })
            .collect();
        rank(&mut contributors);

        RepositoryStat {
            lines,
            contributors,
            files_scanned,
            files_failed,
        }
    }
}

/// Descending by combined total; equal totals ordered by email.
pub fn rank(contributors: &mut [Contributor]) {
    contributors.sort_by(|a, b| {
        b.total_lines()
            .cmp(&a.total_lines())
            .then_with(|| a.email.cmp(&b.email))
    });
}
