//! Commit Ledger
//!
//! Guarantees every commit is resolved at most once per run. The same commit can
//! show up in several push events (force-pushes, pushes to multiple branches, or
//! overlapping feed pages), so every `(repo, sha)` pair is checked here before a
//! fetch is scheduled.
//!
//! The ledger is a concurrent set and can be cloned into worker tasks; clones share
//! the same underlying state.

use dashmap::DashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CommitLedger {
    seen: Arc<DashSet<(String, String)>>,
    duplicates: Arc<AtomicUsize>,
}

impl CommitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `(repo, sha)`. Returns false if it was already claimed.
    pub fn claim(&self, repo: &str, sha: &str) -> bool {
        let fresh = self.seen.insert((repo.to_string(), sha.to_string()));
        if !fresh {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    pub fn contains(&self, repo: &str, sha: &str) -> bool {
        self.seen.contains(&(repo.to_string(), sha.to_string()))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Claims rejected because the pair was already present.
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::Relaxed)
    }
}
