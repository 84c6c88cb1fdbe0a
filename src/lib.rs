//! langchurn Library
//!
//! Computes per-language code churn (lines added and deleted) for a user from a git
//! forge's public event feed. The feed is paginated, each push references commits,
//! and every commit has to be fetched on its own to learn which files it touched.
//!
//! ## Core Features
//!
//! - **Lazy pagination**: the event feed is walked page by page through `Link` headers
//! - **Bounded fan-out**: commit details are fetched concurrently on a fixed-size pool
//! - **Single-owner aggregation**: results funnel through one collector, so totals
//!   need no locking and do not depend on completion order
//! - **Graceful degradation**: rate limits are waited out, failed commits are isolated,
//!   and a broken page keeps whatever was already aggregated
//!
//! ## Architecture Overview
//!
//! - [`pagination`] - `Link` header parsing and the page cursor iterator
//! - [`filter`] - push-event and author selection
//! - [`client`] - the [`ForgeApi`] seam and its HTTP implementation
//! - [`fetcher`] - commit detail resolution with retries
//! - [`aggregator`] - the end-to-end run and concurrency policy
//! - [`language`] - extension to language classification
//! - [`stats`] - per-language accumulation
//! - [`dedup`] - at-most-once commit scheduling
//! - [`retry`] - backoff and rate-limit waits
//! - [`config`] - configuration with file and environment support
//! - [`logging`] - structured logging setup
//! - [`display`] - terminal and JSON rendering
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use langchurn::{Credentials, FanOutAggregator, FanOutOptions, HttpForgeClient, LanguageClassifier};
//! use langchurn::config::ApiConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = HttpForgeClient::new(&ApiConfig::default(), Credentials::new("alice", "token"))?;
//! let aggregator = FanOutAggregator::new(
//!     Arc::new(client),
//!     Arc::new(LanguageClassifier::default()),
//!     FanOutOptions::default(),
//! );
//!
//! let outcome = aggregator.run("alice").await?;
//! for (language, stat) in outcome.report.iter() {
//!     println!("{language}: +{} -{}", stat.added, stat.deleted);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod client;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod display;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod language;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod retry;
pub mod stats;

pub use aggregator::{CommitFailure, FailurePolicy, FanOutAggregator, FanOutOptions, RunOutcome, RunSummary};
pub use client::{ForgeApi, HttpForgeClient};
pub use credentials::{CredentialProvider, Credentials, EnvCredentials};
pub use error::{ChurnError, ChurnResult};
pub use language::LanguageClassifier;
pub use models::*;
