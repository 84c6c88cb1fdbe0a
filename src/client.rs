//! Forge REST API access.
//!
//! [`ForgeApi`] is the seam between the pipeline and the network: the aggregator only
//! ever talks to this trait, so tests drive it with an in-memory forge while the binary
//! uses [`HttpForgeClient`].
//!
//! ## Endpoints
//!
//! - `GET {base}/users/{user}/events` - event feed, paginated through the `Link` header
//! - `GET {base}/repos/{repo}/commits/{sha}` - commit detail with its `files` list
//!
//! ## Status Mapping
//!
//! | Response                                           | Error                       |
//! |----------------------------------------------------|-----------------------------|
//! | 429, or 403 with `Retry-After` / exhausted quota   | [`ChurnError::RateLimited`] |
//! | any other non-2xx                                  | [`ChurnError::Status`]      |
//! | 2xx with undecodable or incomplete JSON            | [`ChurnError::MalformedResponse`] |
//!
//! The first-page promotion of `Status` to `AuthFailure` happens in
//! [`crate::pagination`], which is the only place that knows a page is the first.

use crate::config::ApiConfig;
use crate::credentials::Credentials;
use crate::error::{ChurnError, ChurnResult};
use crate::models::{CommitDetail, Event, FileChange, RawEvent};
use crate::pagination::{next_link, Page, PageSource};
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

pub const OTP_HEADER: &str = "X-GitHub-OTP";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

pub trait ForgeApi: Send + Sync + 'static {
    /// URL of the first page of `user`'s event feed.
    fn events_url(&self, user: &str) -> String;

    fn fetch_events<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ChurnResult<Page<Event>>>;

    fn fetch_commit_files<'a>(
        &'a self,
        repo: &'a str,
        sha: &'a str,
    ) -> BoxFuture<'a, ChurnResult<Vec<FileChange>>>;
}

/// Adapts a [`ForgeApi`] event feed to [`PageSource`].
pub struct EventFeed<'a, A: ForgeApi + ?Sized>(pub &'a A);

impl<A: ForgeApi + ?Sized> PageSource for EventFeed<'_, A> {
    type Item = Event;

    fn fetch_page<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ChurnResult<Page<Event>>> {
        self.0.fetch_events(url)
    }
}

#[derive(Debug, Clone)]
pub struct HttpForgeClient {
    http: reqwest::Client,
    base_url: Url,
    per_page: u32,
    credentials: Credentials,
}

impl HttpForgeClient {
    pub fn new(config: &ApiConfig, credentials: Credentials) -> ChurnResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ChurnError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ChurnError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url,
            per_page: config.per_page,
            credentials,
        })
    }

    /// `{base}/repos/{owner}/{name}/commits/{sha}`; `repo` is split on `/` into its parts.
    pub fn commit_url(&self, repo: &str, sha: &str) -> String {
        let segments = ["repos"]
            .into_iter()
            .chain(repo.split('/'))
            .chain(["commits", sha]);
        self.endpoint(segments).to_string()
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Url {
        let mut url = self.base_url.clone();
        // Hierarchical bases are checked in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get(&self, url: &str) -> ChurnResult<reqwest::Response> {
        let mut request = self
            .http
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.secret));
        if let Some(otp) = &self.credentials.otp {
            request = request.header(OTP_HEADER, otp);
        }

        trace!(url, "GET");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(url, status, &headers, &body, Utc::now().timestamp()))
    }

    async fn get_events(&self, url: &str) -> ChurnResult<Page<Event>> {
        let response = self.get(url).await?;
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let body = response.bytes().await?;

        let raw: Vec<RawEvent> = decode(url, &body)?;
        debug!(url, events = raw.len(), has_next = next.is_some(), "Decoded event page");

        Ok(Page {
            items: raw.into_iter().map(Event::from).collect(),
            next,
        })
    }

    async fn get_commit_files(&self, repo: &str, sha: &str) -> ChurnResult<Vec<FileChange>> {
        let url = self.commit_url(repo, sha);
        let response = self.get(&url).await?;
        let body = response.bytes().await?;
        let detail: CommitDetail = decode(&url, &body)?;
        Ok(detail.files)
    }
}

impl ForgeApi for HttpForgeClient {
    fn events_url(&self, user: &str) -> String {
        let mut url = self.endpoint(["users", user, "events"]);
        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string());
        url.to_string()
    }

    fn fetch_events<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ChurnResult<Page<Event>>> {
        self.get_events(url).boxed()
    }

    fn fetch_commit_files<'a>(
        &'a self,
        repo: &'a str,
        sha: &'a str,
    ) -> BoxFuture<'a, ChurnResult<Vec<FileChange>>> {
        self.get_commit_files(repo, sha).boxed()
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> ChurnResult<T> {
    serde_json::from_slice(body).map_err(|e| ChurnError::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Maps a non-success response to an error. `now` is the current Unix time in seconds.
pub fn status_error(
    url: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    now: i64,
) -> ChurnError {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        let retry_after = header_u64(headers, RETRY_AFTER.as_str()).map(Duration::from_secs);
        let exhausted = header_u64(headers, RATE_LIMIT_REMAINING) == Some(0);

        if status == StatusCode::TOO_MANY_REQUESTS || retry_after.is_some() || exhausted {
            let retry_after = retry_after.or_else(|| {
                header_u64(headers, RATE_LIMIT_RESET)
                    .map(|reset| Duration::from_secs((reset as i64 - now).max(0) as u64))
            });
            return ChurnError::RateLimited {
                status: status.as_u16(),
                retry_after,
            };
        }
    }

    ChurnError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        message: error_message(body),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// The forge reports errors as `{"message": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}
