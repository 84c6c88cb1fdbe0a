//! Cursor-paginated collection walking.
//!
//! A collection endpoint returns one page of items plus a `Link` header naming the
//! URL of the next page. [`PageCursorIterator`] buffers the current page, hands items
//! out oldest-first, and fetches the next page only when the buffer runs dry. Pages
//! are requested strictly one after another because each cursor comes from the page
//! before it.
//!
//! Failure handling differs by position: a rejected first page is reported as
//! [`ChurnError::AuthFailure`] (unless it was rate limiting), later pages surface as
//! [`ChurnError::PageFetch`] so callers can keep what they already aggregated.

use crate::error::{ChurnError, ChurnResult};
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// One page of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// URL of the following page, when the server advertised one
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn with_next(items: Vec<T>, next: impl Into<String>) -> Self {
        Self {
            items,
            next: Some(next.into()),
        }
    }
}

/// Anything that can fetch a page by URL.
pub trait PageSource: Send + Sync {
    type Item: Send;

    fn fetch_page<'a>(&'a self, url: &'a str) -> BoxFuture<'a, ChurnResult<Page<Self::Item>>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub rel: String,
}

/// Parses an RFC 8288 `Link` header value: `<url>; rel="next", <url>; rel="last"`.
///
/// Entries that do not have both a bracketed URL and a `rel` parameter are skipped.
/// A space-separated `rel` list yields one [`Link`] per relation. Commas inside `<...>`
/// belong to the URL.
pub fn parse_link_header(value: &str) -> Vec<Link> {
    let mut links = Vec::new();

    for entry in split_entries(value) {
        let mut parts = entry.split(';');
        let url = match parts.next().map(str::trim) {
            Some(raw) if raw.starts_with('<') && raw.ends_with('>') => &raw[1..raw.len() - 1],
            _ => continue,
        };

        for param in parts {
            let Some((key, val)) = param.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("rel") {
                continue;
            }
            let rels = val.trim().trim_matches('"');
            for rel in rels.split_whitespace() {
                links.push(Link {
                    url: url.to_string(),
                    rel: rel.to_ascii_lowercase(),
                });
            }
        }
    }

    links
}

/// Splits a header value on the commas that separate link entries.
fn split_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_url = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '<' => in_url = true,
            '>' => in_url = false,
            ',' if !in_url => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// URL of the `next` relation in a `Link` header value.
pub fn next_link(value: &str) -> Option<String> {
    parse_link_header(value)
        .into_iter()
        .find(|link| link.rel == "next")
        .map(|link| link.url)
}

/// Lazy item sequence over a cursor-paginated collection.
pub struct PageCursorIterator<'a, S: PageSource + ?Sized> {
    source: &'a S,
    retry: &'a RetryPolicy,
    buffer: VecDeque<S::Item>,
    next: Option<String>,
    visited: HashSet<String>,
    pages_fetched: usize,
}

impl<'a, S: PageSource + ?Sized> PageCursorIterator<'a, S> {
    /// Fetches the first page. Any rejection other than rate limiting is an auth failure.
    pub async fn start(source: &'a S, retry: &'a RetryPolicy, url: &str) -> ChurnResult<Self> {
        let page = retry
            .run(url, || source.fetch_page(url))
            .await
            .map_err(first_page_error)?;

        debug!(url, items = page.items.len(), has_next = page.next.is_some(), "Fetched first page");

        let mut visited = HashSet::new();
        visited.insert(url.to_string());

        Ok(Self {
            source,
            retry,
            buffer: page.items.into(),
            next: page.next,
            visited,
            pages_fetched: 1,
        })
    }

    /// Next item, fetching the following page when the buffer is empty.
    ///
    /// `Ok(None)` marks the end; after that every call returns `Ok(None)` without I/O.
    pub async fn next(&mut self) -> ChurnResult<Option<S::Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let Some(url) = self.next.take() else {
                return Ok(None);
            };

            if !self.visited.insert(url.clone()) {
                warn!(url = %url, "Next page already visited, ending pagination");
                return Ok(None);
            }

            let page = self
                .retry
                .run(&url, || self.source.fetch_page(&url))
                .await
                .map_err(|source| ChurnError::PageFetch {
                    url: url.clone(),
                    source: Box::new(source),
                })?;

            self.pages_fetched += 1;
            debug!(
                url = %url,
                page = self.pages_fetched,
                items = page.items.len(),
                has_next = page.next.is_some(),
                "Fetched page"
            );

            self.buffer = page.items.into();
            self.next = page.next;
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Drains the remaining sequence into a vector.
    pub async fn collect_all(mut self) -> ChurnResult<Vec<S::Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

fn first_page_error(err: ChurnError) -> ChurnError {
    match err {
        ChurnError::Status {
            status, message, ..
        } => ChurnError::AuthFailure { status, message },
        other => other,
    }
}
