//! Fan-Out Aggregation Engine
//!
//! This module drives a whole churn run: it walks the event feed, selects the
//! commits that count, resolves them concurrently, and folds their file changes into
//! per-language totals.
//!
//! ## Pipeline
//!
//! 1. **Pagination**: events are pulled one at a time from a [`PageCursorIterator`];
//!    pages are fetched strictly in sequence
//! 2. **Filtering**: [`EventFilter`] keeps push events by the target user and the
//!    commits that user authored
//! 3. **Deduplication**: [`CommitLedger`] rejects any `(repo, sha)` already scheduled
//! 4. **Fan-out**: each surviving commit becomes a task on a bounded pool; the
//!    scheduler takes a semaphore permit *before* spawning, so pagination slows
//!    down when the pool is saturated
//! 5. **Collection**: every task sends its result over an mpsc channel to a single
//!    collector that owns the [`LanguageTotals`]; nothing else touches the totals
//! 6. **Report**: totals become a [`StatReport`] with empty languages pruned
//!
//! Commit fetches for page *n* keep running while page *n + 1* is requested.
//! Because accumulation is plain addition, completion order never affects totals.
//!
//! ## Failure Handling
//!
//! - First page rejected: the run fails with the pagination error, nothing is spawned
//! - Later page fails: pagination stops, already scheduled commits still complete,
//!   and the outcome is marked truncated
//! - Commit fetch fails: with [`FailurePolicy::Isolate`] the commit is recorded in
//!   [`RunOutcome::failures`] and skipped; with [`FailurePolicy::FailFast`] the run
//!   stops and returns [`ChurnError::CommitFetch`]
//! - Worker panics: treated like a failed fetch of the commit that worker was resolving
//!
//! Under fail-fast the scheduler stops waiting for pool permits as soon as the collector
//! gives up, and outstanding fetches are aborted.
//!
//! ## Cancellation
//!
//! Dropping the future returned by [`FanOutAggregator::run`] aborts every in-flight
//! fetch (the worker [`JoinSet`] aborts its tasks on drop). [`FanOutOptions::run_timeout`]
//! and [`FanOutAggregator::run_until`] are both built on that.

use crate::client::{EventFeed, ForgeApi};
use crate::config::Config;
use crate::dedup::CommitLedger;
use crate::error::{ChurnError, ChurnResult};
use crate::fetcher::CommitFetcher;
use crate::filter::EventFilter;
use crate::language::LanguageClassifier;
use crate::models::{Event, FileChange, StatReport};
use crate::pagination::{PageCursorIterator, PageSource};
use crate::retry::RetryPolicy;
use crate::stats::LanguageTotals;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failed commit and keep going
    Isolate,
    /// Abort the run on the first failed commit
    FailFast,
}

#[derive(Debug, Clone)]
pub struct FanOutOptions {
    /// Maximum commit fetches in flight
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub retry: RetryPolicy,
    pub run_timeout: Option<Duration>,
}

impl Default for FanOutOptions {
    fn default() -> Self {
        Self {
            concurrency: 16,
            failure_policy: FailurePolicy::Isolate,
            retry: RetryPolicy::default(),
            run_timeout: None,
        }
    }
}

impl FanOutOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.fanout.concurrency.max(1),
            failure_policy: if config.fanout.fail_fast {
                FailurePolicy::FailFast
            } else {
                FailurePolicy::Isolate
            },
            retry: config.retry.policy(),
            run_timeout: config.fanout.run_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFailure {
    pub repo: String,
    pub sha: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pages: usize,
    pub events_seen: usize,
    pub events_matched: usize,
    pub commits_scheduled: usize,
    pub commits_resolved: usize,
    pub commits_failed: usize,
    pub duplicate_commits: usize,
    pub unclassified_files: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub user: String,
    pub report: StatReport,
    pub failures: Vec<CommitFailure>,
    /// Why pagination stopped early, if it did
    pub truncated: Option<String>,
    pub summary: RunSummary,
}

impl RunOutcome {
    /// True when every page was read and every scheduled commit resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.truncated.is_none()
    }
}

struct CommitOutcome {
    repo: String,
    sha: String,
    result: ChurnResult<Vec<FileChange>>,
}

struct Collected {
    totals: LanguageTotals,
    failures: Vec<CommitFailure>,
    resolved: usize,
}

struct Scheduled {
    workers: JoinSet<()>,
    /// Commit each live worker is resolving, keyed by task
    in_flight: HashMap<task::Id, (String, String)>,
    /// Workers that panicked before reporting a result
    panicked: Vec<CommitFailure>,
    events_seen: usize,
    events_matched: usize,
    commits_scheduled: usize,
    truncated: Option<String>,
}

impl Scheduled {
    /// Bookkeeping for one finished worker. Returns true if it panicked.
    fn reap(&mut self, joined: Result<(task::Id, ()), JoinError>) -> bool {
        let (id, panic) = match joined {
            Ok((id, ())) => (id, None),
            Err(err) => (err.id(), err.is_panic().then(|| err.to_string())),
        };
        let commit = self.in_flight.remove(&id);

        let Some(error) = panic else {
            return false;
        };
        let (repo, sha) = commit.unwrap_or_default();
        warn!(repo = %repo, sha = %sha, error = %error, "Commit worker panicked");
        self.panicked.push(CommitFailure { repo, sha, error });
        true
    }

    /// Reaps every worker that has already finished without waiting.
    fn reap_finished(&mut self) -> bool {
        let mut panicked = false;
        while let Some(joined) = self.workers.try_join_next_with_id() {
            panicked |= self.reap(joined);
        }
        panicked
    }
}

pub struct FanOutAggregator<A: ForgeApi + ?Sized> {
    api: Arc<A>,
    fetcher: CommitFetcher<A>,
    classifier: Arc<LanguageClassifier>,
    options: FanOutOptions,
}

impl<A: ForgeApi + ?Sized> FanOutAggregator<A> {
    pub fn new(api: Arc<A>, classifier: Arc<LanguageClassifier>, options: FanOutOptions) -> Self {
        let fetcher = CommitFetcher::new(Arc::clone(&api), options.retry.clone());
        Self {
            api,
            fetcher,
            classifier,
            options,
        }
    }

    pub fn options(&self) -> &FanOutOptions {
        &self.options
    }

    /// Computes the churn report for `user`, honouring the configured run timeout.
    pub async fn run(&self, user: &str) -> ChurnResult<RunOutcome> {
        let run = self
            .run_inner(user)
            .instrument(info_span!("churn_run", user = %user));

        match self.options.run_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| ChurnError::DeadlineExceeded(limit))?,
            None => run.await,
        }
    }

    /// Like [`run`](Self::run), but gives up with [`ChurnError::Cancelled`] once
    /// `shutdown` completes.
    pub async fn run_until<F>(&self, user: &str, shutdown: F) -> ChurnResult<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            outcome = self.run(user) => outcome,
            _ = shutdown => {
                warn!(user, "Run cancelled, aborting in-flight fetches");
                Err(ChurnError::Cancelled)
            }
        }
    }

    async fn run_inner(&self, user: &str) -> ChurnResult<RunOutcome> {
        let feed = EventFeed(self.api.as_ref());
        let url = self.api.events_url(user);
        info!(url = %url, concurrency = self.options.concurrency, "Starting churn run");

        let mut events = PageCursorIterator::start(&feed, &self.options.retry, &url).await?;

        let filter = EventFilter::new(user);
        let ledger = CommitLedger::new();
        let (tx, rx) = mpsc::channel(self.options.concurrency * 2);

        let collector = collect_outcomes(
            rx,
            LanguageTotals::new(Arc::clone(&self.classifier)),
            self.options.failure_policy,
        );
        let scheduler = self.schedule_commits(&mut events, &filter, &ledger, tx);
        let (scheduled, collected) = tokio::join!(scheduler, collector);

        let mut scheduled = scheduled;
        let mut collected = match collected {
            Ok(collected) => collected,
            Err(err) => {
                scheduled.workers.abort_all();
                return Err(err);
            }
        };

        while let Some(joined) = scheduled.workers.join_next_with_id().await {
            scheduled.reap(joined);
        }
        if self.options.failure_policy == FailurePolicy::FailFast {
            if let Some(first) = scheduled.panicked.first() {
                return Err(ChurnError::CommitFetch {
                    repo: first.repo.clone(),
                    sha: first.sha.clone(),
                    source: Box::new(ChurnError::Task(first.error.clone())),
                });
            }
        }
        collected.failures.append(&mut scheduled.panicked);

        let summary = RunSummary {
            pages: events.pages_fetched(),
            events_seen: scheduled.events_seen,
            events_matched: scheduled.events_matched,
            commits_scheduled: scheduled.commits_scheduled,
            commits_resolved: collected.resolved,
            commits_failed: collected.failures.len(),
            duplicate_commits: ledger.duplicates(),
            unclassified_files: collected.totals.unclassified(),
        };
        let report = collected.totals.into_report();

        info!(
            pages = summary.pages,
            commits = summary.commits_resolved,
            failed = summary.commits_failed,
            languages = report.len(),
            "Churn run finished"
        );

        Ok(RunOutcome {
            user: user.to_string(),
            report,
            failures: collected.failures,
            truncated: scheduled.truncated,
            summary,
        })
    }

    /// Pulls events and spawns one bounded fetch per fresh authored commit.
    ///
    /// Consumes `tx`; the collector finishes once this returns and every worker is done.
    async fn schedule_commits<S>(
        &self,
        events: &mut PageCursorIterator<'_, S>,
        filter: &EventFilter,
        ledger: &CommitLedger,
        tx: mpsc::Sender<CommitOutcome>,
    ) -> Scheduled
    where
        S: PageSource<Item = Event> + ?Sized,
    {
        let permits = Arc::new(Semaphore::new(self.options.concurrency));
        let mut scheduled = Scheduled {
            workers: JoinSet::new(),
            in_flight: HashMap::new(),
            panicked: Vec::new(),
            events_seen: 0,
            events_matched: 0,
            commits_scheduled: 0,
            truncated: None,
        };

        'feed: loop {
            // Collector gone means a fail-fast abort
            if tx.is_closed() {
                break;
            }

            let event = match events.next().await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Pagination stopped early, keeping partial results");
                    scheduled.truncated = Some(err.to_string());
                    break;
                }
            };

            scheduled.events_seen += 1;
            if !filter.matches(&event) {
                continue;
            }
            scheduled.events_matched += 1;

            for commit in filter.authored_commits(&event) {
                if !ledger.claim(&event.repo_name, &commit.sha) {
                    debug!(repo = %event.repo_name, sha = %commit.sha, "Skipping duplicate commit");
                    continue;
                }

                if tx.is_closed() {
                    break 'feed;
                }
                // A saturated pool must not outlive a fail-fast abort
                let permit = tokio::select! {
                    acquired = Arc::clone(&permits).acquire_owned() => match acquired {
                        Ok(permit) => permit,
                        Err(_) => break 'feed,
                    },
                    _ = tx.closed() => break 'feed,
                };

                let fetcher = self.fetcher.clone();
                let tx = tx.clone();
                let repo = event.repo_name.clone();
                let sha = commit.sha.clone();

                let handle = scheduled.workers.spawn(async move {
                    let result = fetcher.fetch(&repo, &sha).await;
                    // A closed channel only means the run already failed
                    let _ = tx.send(CommitOutcome { repo, sha, result }).await;
                    drop(permit);
                });
                scheduled
                    .in_flight
                    .insert(handle.id(), (event.repo_name.clone(), commit.sha.clone()));
                scheduled.commits_scheduled += 1;
            }

            if scheduled.reap_finished() && self.options.failure_policy == FailurePolicy::FailFast {
                scheduled.workers.abort_all();
                break;
            }
        }

        scheduled
    }
}

/// Single owner of the totals; merges results in whatever order they finish.
async fn collect_outcomes(
    mut rx: mpsc::Receiver<CommitOutcome>,
    mut totals: LanguageTotals,
    policy: FailurePolicy,
) -> ChurnResult<Collected> {
    let mut failures = Vec::new();
    let mut resolved = 0;

    while let Some(outcome) = rx.recv().await {
        match outcome.result {
            Ok(files) => {
                resolved += 1;
                totals.merge_all(&files);
            }
            Err(err) => match policy {
                FailurePolicy::FailFast => return Err(err),
                FailurePolicy::Isolate => {
                    warn!(repo = %outcome.repo, sha = %outcome.sha, error = %err, "Skipping commit");
                    failures.push(CommitFailure {
                        repo: outcome.repo,
                        sha: outcome.sha,
                        error: err.to_string(),
                    });
                }
            },
        }
    }

    Ok(Collected {
        totals,
        failures,
        resolved,
    })
}
