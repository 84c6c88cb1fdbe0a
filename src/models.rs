//! Core Data Models
//!
//! This module defines the data structures that flow through the churn pipeline,
//! from raw feed records to the final per-language report.
//!
//! ## Data Flow
//!
//! 1. **Feed**: [`Event`] - One record from the user's event feed, with its embedded
//!    [`CommitRef`]s when the event is a push
//! 2. **Detail**: [`FileChange`] - One file entry from a commit detail response
//! 3. **Accumulation**: [`LanguageStat`] - Running added/deleted totals for a language
//! 4. **Output**: [`StatReport`] - Non-zero language totals handed to the display layer
//!
//! ## Wire Shapes
//!
//! Events arrive in the forge's nested layout (`type`, `actor.login`, `repo.name`,
//! `payload.commits[].author.name`). [`RawEvent`] mirrors that layout for serde and is
//! flattened into [`Event`] straight away so the rest of the crate never sees it.
//! Commit details deserialize through [`CommitDetail`], whose `files` key is optional
//! while every field of a file entry is required.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire name of push events in the feed.
pub const PUSH_EVENT_TYPE: &str = "PushEvent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Push,
    Other(String),
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        if value == PUSH_EVENT_TYPE {
            EventKind::Push
        } else {
            EventKind::Other(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub actor_login: String,
    pub repo_name: String,
    pub commits: Vec<CommitRef>,
}

impl Event {
    pub fn is_push(&self) -> bool {
        self.kind == EventKind::Push
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub author_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    #[serde(rename = "filename")]
    pub file_name: String,
    pub additions: u64,
    pub deletions: u64,
}

impl FileChange {
    pub fn new(file_name: impl Into<String>, additions: u64, deletions: u64) -> Self {
        Self {
            file_name: file_name.into(),
            additions,
            deletions,
        }
    }
}

/// Feed record exactly as the forge serializes it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: RawActor,
    pub repo: RawRepo,
    #[serde(default)]
    pub payload: RawPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawActor {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRepo {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub commits: Vec<RawCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommit {
    pub sha: String,
    pub author: RawAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAuthor {
    pub name: String,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let kind = EventKind::from(raw.event_type);
        // Only pushes carry commit lists worth keeping
        let commits = match kind {
            EventKind::Push => raw
                .payload
                .commits
                .into_iter()
                .map(|c| CommitRef {
                    author_name: c.author.name,
                    sha: c.sha,
                })
                .collect(),
            EventKind::Other(_) => Vec::new(),
        };

        Event {
            kind,
            actor_login: raw.actor.login,
            repo_name: raw.repo.name,
            commits,
        }
    }
}

/// Commit detail response; only the file list matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageStat {
    pub added: u64,
    pub deleted: u64,
}

impl LanguageStat {
    pub fn record(&mut self, change: &FileChange) {
        self.added += change.additions;
        self.deleted += change.deletions;
    }

    pub fn total(&self) -> u64 {
        self.added + self.deleted
    }

    pub fn net(&self) -> i64 {
        self.added as i64 - self.deleted as i64
    }

    pub fn is_zero(&self) -> bool {
        self.added == 0 && self.deleted == 0
    }
}

/// Language totals with every all-zero entry removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StatReport {
    languages: BTreeMap<String, LanguageStat>,
}

impl StatReport {
    pub fn from_totals<I>(totals: I) -> Self
    where
        I: IntoIterator<Item = (String, LanguageStat)>,
    {
        Self {
            languages: totals
                .into_iter()
                .filter(|(_, stat)| !stat.is_zero())
                .collect(),
        }
    }

    pub fn get(&self, language: &str) -> Option<&LanguageStat> {
        self.languages.get(language)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LanguageStat)> {
        self.languages.iter()
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    /// Sum across all languages.
    pub fn overall(&self) -> LanguageStat {
        self.languages
            .values()
            .fold(LanguageStat::default(), |acc, stat| LanguageStat {
                added: acc.added + stat.added,
                deleted: acc.deleted + stat.deleted,
            })
    }
}
