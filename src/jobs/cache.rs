use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::identity::RepoToken;
use crate::domain::stats::RepositoryStat;

/// Completed results held by a worker.
///
/// Bounded by `capacity` (oldest insertion evicted first) and, optionally,
/// by a time-to-live checked on access.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<RepoToken, (Instant, Arc<RepositoryStat>)>,
    order: VecDeque<RepoToken>,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        ResultCache {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, token: RepoToken, stat: Arc<RepositoryStat>) {
        self.insert_at(token, stat, Instant::now());
    }

    fn insert_at(&mut self, token: RepoToken, stat: Arc<RepositoryStat>, now: Instant) {
        if self.entries.insert(token.clone(), (now, stat)).is_some() {
            self.order.retain(|t| t != &token);
        }
        self.order.push_back(token);
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn get(&mut self, token: &RepoToken) -> Option<Arc<RepositoryStat>> {
        self.get_at(token, Instant::now())
    }

    fn get_at(&mut self, token: &RepoToken, now: Instant) -> Option<Arc<RepositoryStat>> {
        let (stored, stat) = self.entries.get(token)?;
        if self.is_expired(*stored, now) {
            self.remove(token);
            return None;
        }
        Some(Arc::clone(stat))
    }

    pub fn contains(&mut self, token: &RepoToken) -> bool {
        self.get(token).is_some()
    }

    pub fn remove(&mut self, token: &RepoToken) {
        if self.entries.remove(token).is_some() {
            self.order.retain(|t| t != token);
        }
    }

    /// Drop every expired entry.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<RepoToken> = self
            .entries
            .iter()
            .filter(|(_, (stored, _))| self.is_expired(*stored, now))
            .map(|(t, _)| t.clone())
            .collect();
        for t in &expired {
            self.remove(t);
        }
        expired.len()
    }

    fn is_expired(&self, stored: Instant, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(stored) > ttl)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::RepoIdentity;

    fn token(name: &str) -> RepoToken {
        RepoIdentity::parse(&format!("https://github.com/o/{name}"))
            .unwrap()
            .token()
    }

    fn stat(files: u64) -> Arc<RepositoryStat> {
        Arc::new(RepositoryStat {
            files_scanned: files,
            ..Default::default()
        })
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut c = ResultCache::new(2, None);
        c.insert(token("a"), stat(1));
        c.insert(token("b"), stat(2));
        c.insert(token("c"), stat(3));
        assert_eq!(c.len(), 2);
        assert!(!c.contains(&token("a")));
        assert_eq!(c.get(&token("c")).unwrap().files_scanned, 3);
    }

    #[test]
    fn reinsert_refreshes_position() {
        let mut c = ResultCache::new(2, None);
        c.insert(token("a"), stat(1));
        c.insert(token("b"), stat(2));
        c.insert(token("a"), stat(10));
        c.insert(token("c"), stat(3));
        assert!(c.contains(&token("a")));
        assert!(!c.contains(&token("b")));
        assert_eq!(c.get(&token("a")).unwrap().files_scanned, 10);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut c = ResultCache::new(8, Some(Duration::from_secs(10)));
        let t0 = Instant::now();
        c.insert_at(token("a"), stat(1), t0);
        assert!(c.get_at(&token("a"), t0 + Duration::from_secs(5)).is_some());
        assert!(c.get_at(&token("a"), t0 + Duration::from_secs(11)).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn no_ttl_keeps_entries() {
        let mut c = ResultCache::new(8, None);
        c.insert(token("a"), stat(1));
        assert_eq!(c.purge_expired(), 0);
        assert_eq!(c.len(), 1);
    }
}
