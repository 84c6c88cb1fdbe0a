//! Selection of the events and commits that count toward a user's churn.
//!
//! An event qualifies when it is a push whose actor is the target login. Within a
//! qualifying event only commits whose author *display name* equals the same login
//! are kept. The name comparison is literal: a differing display name drops a real
//! contribution, and a foreign account sharing the name is counted.

use crate::models::{CommitRef, Event};

#[derive(Debug, Clone)]
pub struct EventFilter {
    target_user: String,
}

impl EventFilter {
    pub fn new(target_user: impl Into<String>) -> Self {
        Self {
            target_user: target_user.into(),
        }
    }

    pub fn target_user(&self) -> &str {
        &self.target_user
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.is_push() && event.actor_login == self.target_user
    }

    /// Commits of `event` authored by the target user; empty for non-qualifying events.
    pub fn authored_commits<'a>(&'a self, event: &'a Event) -> impl Iterator<Item = &'a CommitRef> + 'a {
        let commits: &'a [CommitRef] = if self.matches(event) {
            &event.commits
        } else {
            &[]
        };
        commits
            .iter()
            .filter(move |commit| commit.author_name == self.target_user)
    }
}
