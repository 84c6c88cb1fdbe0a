#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use langchurn::pagination::Page;
use langchurn::{ChurnError, ChurnResult, CommitRef, Event, EventKind, FileChange, ForgeApi};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const BASE: &str = "https://forge.test";

/// Scripted in-memory forge.
#[derive(Default)]
pub struct FakeForge {
    pages: HashMap<String, Page<Event>>,
    page_failures: HashMap<String, u16>,
    commits: HashMap<(String, String), Vec<FileChange>>,
    failing_commits: HashSet<String>,
    rate_limit_once: Mutex<HashSet<String>>,
    hanging_commits: HashSet<String>,
    panicking_commits: HashSet<String>,
    delay: Option<Duration>,
    commit_calls: Mutex<Vec<String>>,
    page_calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub fn page_url(user: &str, n: usize) -> String {
    if n == 1 {
        format!("{BASE}/users/{user}/events")
    } else {
        format!("{BASE}/users/{user}/events?page={n}")
    }
}

pub fn push(actor: &str, repo: &str, commits: &[(&str, &str)]) -> Event {
    Event {
        kind: EventKind::Push,
        actor_login: actor.to_string(),
        repo_name: repo.to_string(),
        commits: commits
            .iter()
            .map(|(author, sha)| CommitRef {
                author_name: author.to_string(),
                sha: sha.to_string(),
            })
            .collect(),
    }
}

pub fn other(kind: &str, actor: &str, repo: &str) -> Event {
    Event {
        kind: EventKind::Other(kind.to_string()),
        actor_login: actor.to_string(),
        repo_name: repo.to_string(),
        commits: Vec::new(),
    }
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `pages` as `user`'s feed, each linking to the next.
    pub fn with_feed(mut self, user: &str, pages: Vec<Vec<Event>>) -> Self {
        let count = pages.len();
        for (i, items) in pages.into_iter().enumerate() {
            let page = if i + 1 < count {
                Page::with_next(items, page_url(user, i + 2))
            } else {
                Page::last(items)
            };
            self.pages.insert(page_url(user, i + 1), page);
        }
        self
    }

    pub fn with_commit(mut self, repo: &str, sha: &str, files: Vec<FileChange>) -> Self {
        self.commits
            .insert((repo.to_string(), sha.to_string()), files);
        self
    }

    pub fn with_failing_commit(mut self, sha: &str) -> Self {
        self.failing_commits.insert(sha.to_string());
        self
    }

    pub fn with_rate_limited_commit(self, sha: &str) -> Self {
        self.rate_limit_once.lock().unwrap().insert(sha.to_string());
        self
    }

    pub fn with_hanging_commit(mut self, sha: &str) -> Self {
        self.hanging_commits.insert(sha.to_string());
        self
    }

    pub fn with_panicking_commit(mut self, sha: &str) -> Self {
        self.panicking_commits.insert(sha.to_string());
        self
    }

    pub fn with_failing_page(mut self, url: String, status: u16) -> Self {
        self.page_failures.insert(url, status);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn commit_calls(&self) -> Vec<String> {
        self.commit_calls.lock().unwrap().clone()
    }

    pub fn page_calls(&self) -> Vec<String> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn commit(&self, repo: &str, sha: &str) -> ChurnResult<Vec<FileChange>> {
        self.commit_calls.lock().unwrap().push(sha.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking_commits.contains(sha) {
            panic!("forge blew up on {sha}");
        }
        if self.hanging_commits.contains(sha) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let url = format!("{BASE}/repos/{repo}/commits/{sha}");
        if self.rate_limit_once.lock().unwrap().remove(sha) {
            return Err(ChurnError::RateLimited {
                status: 429,
                retry_after: Some(Duration::from_millis(5)),
            });
        }
        if self.failing_commits.contains(sha) {
            return Err(ChurnError::Status {
                url,
                status: 422,
                message: "No commit found for SHA".to_string(),
            });
        }

        self.commits
            .get(&(repo.to_string(), sha.to_string()))
            .cloned()
            .ok_or(ChurnError::Status {
                url,
                status: 404,
                message: "Not Found".to_string(),
            })
    }
}

impl ForgeApi for FakeForge {
    fn events_url(&self, user: &str) -> String {
        page_url(user, 1)
    }

    fn fetch_events<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ChurnResult<Page<Event>>> {
        async move {
            self.page_calls.lock().unwrap().push(url.to_string());
            if let Some(status) = self.page_failures.get(url) {
                return Err(ChurnError::Status {
                    url: url.to_string(),
                    status: *status,
                    message: "Bad credentials".to_string(),
                });
            }
            self.pages.get(url).cloned().ok_or(ChurnError::Status {
                url: url.to_string(),
                status: 404,
                message: "Not Found".to_string(),
            })
        }
        .boxed()
    }

    fn fetch_commit_files<'a>(
        &'a self,
        repo: &'a str,
        sha: &'a str,
    ) -> BoxFuture<'a, ChurnResult<Vec<FileChange>>> {
        self.commit(repo, sha).boxed()
    }
}
