//! Commit detail resolution.

use crate::client::ForgeApi;
use crate::error::{ChurnError, ChurnResult};
use crate::models::FileChange;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use tracing::debug;

/// Resolves a commit to its file-level changes, retrying transient failures.
///
/// Cheap to clone; every worker task holds its own copy sharing the same client.
pub struct CommitFetcher<A: ForgeApi + ?Sized> {
    api: Arc<A>,
    retry: RetryPolicy,
}

impl<A: ForgeApi + ?Sized> Clone for CommitFetcher<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            retry: self.retry.clone(),
        }
    }
}

impl<A: ForgeApi + ?Sized> CommitFetcher<A> {
    pub fn new(api: Arc<A>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    pub async fn fetch(&self, repo: &str, sha: &str) -> ChurnResult<Vec<FileChange>> {
        let what = format!("{repo}@{sha}");
        let files = self
            .retry
            .run(&what, || self.api.fetch_commit_files(repo, sha))
            .await
            .map_err(|source| ChurnError::CommitFetch {
                repo: repo.to_string(),
                sha: sha.to_string(),
                source: Box::new(source),
            })?;

        debug!(repo, sha, files = files.len(), "Resolved commit");
        Ok(files)
    }
}
