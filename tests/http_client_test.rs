//! Tests for the HTTP forge client against a local socket server.
//!
//! The server speaks just enough HTTP/1.1 for reqwest: one request per connection,
//! `Connection: close` on every reply, and canned JSON bodies keyed by path and query.

use langchurn::config::ApiConfig;
use langchurn::retry::RetryPolicy;
use langchurn::{
    ChurnError, Credentials, FailurePolicy, FanOutAggregator, FanOutOptions, ForgeApi,
    HttpForgeClient, LanguageClassifier, LanguageStat,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const BASIC_ALICE_TOKEN: &str = "Basic YWxpY2U6dG9rZW4=";

#[derive(Clone)]
struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    fn json(body: &str) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
struct SeenRequest {
    target: String,
    headers: HashMap<String, String>,
}

struct TestServer {
    base: String,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl TestServer {
    /// Binds an ephemeral port; `routes` receives the base URL so replies can link to it.
    async fn start<F>(routes: F) -> Self
    where
        F: FnOnce(&str) -> HashMap<String, Reply>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes = Arc::new(routes(&base));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&log);
                tokio::spawn(async move { handle(socket, &routes, &log).await });
            }
        });

        Self { base, seen }
    }

    fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    fn targets(&self) -> Vec<String> {
        self.seen().into_iter().map(|r| r.target).collect()
    }

    fn client(&self, credentials: Credentials) -> HttpForgeClient {
        let config = ApiConfig {
            base_url: self.base.clone(),
            request_timeout_secs: 5,
            ..ApiConfig::default()
        };
        HttpForgeClient::new(&config, credentials).unwrap()
    }
}

async fn handle(
    mut socket: TcpStream,
    routes: &HashMap<String, Reply>,
    log: &Mutex<Vec<SeenRequest>>,
) {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => raw.extend_from_slice(&chunk[..n]),
        }
    }

    let text = String::from_utf8_lossy(&raw);
    let mut lines = text.split("\r\n");
    let target = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let headers = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    log.lock().unwrap().push(SeenRequest {
        target: target.clone(),
        headers,
    });

    let reply = routes
        .get(&target)
        .cloned()
        .unwrap_or_else(|| Reply::json(r#"{"message": "Not Found"}"#).status(404));

    let mut response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn push_event(actor: &str, repo: &str, commits: &[(&str, &str)]) -> String {
    let commits: Vec<String> = commits
        .iter()
        .map(|(author, sha)| format!(r#"{{"sha": "{sha}", "author": {{"name": "{author}"}}}}"#))
        .collect();
    format!(
        r#"{{"type": "PushEvent", "actor": {{"login": "{actor}"}}, "repo": {{"name": "{repo}"}}, "payload": {{"commits": [{}]}}}}"#,
        commits.join(", ")
    )
}

fn options() -> FanOutOptions {
    FanOutOptions {
        concurrency: 2,
        failure_policy: FailurePolicy::Isolate,
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_wait: Duration::from_millis(50),
        },
        run_timeout: Some(Duration::from_secs(10)),
    }
}

fn aggregator(client: HttpForgeClient) -> FanOutAggregator<HttpForgeClient> {
    FanOutAggregator::new(
        Arc::new(client),
        Arc::new(LanguageClassifier::default()),
        options(),
    )
}

#[tokio::test]
async fn test_walks_linked_pages_with_credentials() {
    let server = TestServer::start(|base| {
        let page_two = format!("{base}/users/alice/events?per_page=100&page=2");
        HashMap::from([
            (
                "/users/alice/events?per_page=100".to_string(),
                Reply::json(&format!(
                    "[{}, {}]",
                    push_event("alice", "alice/tool", &[("alice", "c1"), ("bob", "c9")]),
                    r#"{"type": "WatchEvent", "actor": {"login": "alice"}, "repo": {"name": "bob/lib"}, "payload": {}}"#
                ))
                .header(
                    "Link",
                    &format!(r#"<{page_two}>; rel="next", <{page_two}>; rel="last""#),
                ),
            ),
            (
                "/users/alice/events?per_page=100&page=2".to_string(),
                Reply::json(&format!("[{}]", push_event("alice", "alice/other", &[("alice", "c2")]))),
            ),
            (
                "/repos/alice/tool/commits/c1".to_string(),
                Reply::json(
                    r#"{"sha": "c1", "files": [{"filename": "src/a.py", "additions": 10, "deletions": 2, "status": "modified"}]}"#,
                ),
            ),
            (
                "/repos/alice/other/commits/c2".to_string(),
                Reply::json(
                    r#"{"sha": "c2", "files": [{"filename": "lib.rs", "additions": 3, "deletions": 0}, {"filename": "README.md", "additions": 40, "deletions": 1}]}"#,
                ),
            ),
        ])
    })
    .await;

    let client = server.client(Credentials::new("alice", "token").with_otp("123456"));
    let outcome = aggregator(client).run("alice").await.unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.summary.pages, 2);
    assert_eq!(outcome.summary.events_seen, 3);
    assert_eq!(outcome.summary.commits_resolved, 2);
    assert_eq!(outcome.summary.unclassified_files, 1);
    assert_eq!(
        outcome.report.get("Python"),
        Some(&LanguageStat { added: 10, deleted: 2 })
    );
    assert_eq!(
        outcome.report.get("Rust"),
        Some(&LanguageStat { added: 3, deleted: 0 })
    );

    let targets = server.targets();
    assert_eq!(targets.len(), 4);
    assert!(!targets.iter().any(|t| t.contains("c9")));

    for request in server.seen() {
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some(BASIC_ALICE_TOKEN),
            "missing basic auth on {}",
            request.target
        );
        assert_eq!(
            request.headers.get("x-github-otp").map(String::as_str),
            Some("123456")
        );
        assert!(request
            .headers
            .get("user-agent")
            .is_some_and(|ua| ua.starts_with("langchurn/")));
    }
}

#[tokio::test]
async fn test_otp_header_absent_without_second_factor() {
    let server = TestServer::start(|_| {
        HashMap::from([(
            "/users/alice/events?per_page=100".to_string(),
            Reply::json("[]"),
        )])
    })
    .await;

    let client = server.client(Credentials::new("alice", "token"));
    let url = client.events_url("alice");
    let page = client.fetch_events(&url).await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.next, None);
    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].headers.contains_key("x-github-otp"));
}

#[tokio::test]
async fn test_rejected_first_page_is_auth_failure() {
    let server = TestServer::start(|_| {
        HashMap::from([(
            "/users/alice/events?per_page=100".to_string(),
            Reply::json(r#"{"message": "Bad credentials"}"#).status(401),
        )])
    })
    .await;

    let client = server.client(Credentials::new("alice", "wrong"));
    let err = aggregator(client).run("alice").await.unwrap_err();

    match err {
        ChurnError::AuthFailure { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Bad credentials");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Auth failures are not retried
    assert_eq!(server.targets().len(), 1);
}

#[tokio::test]
async fn test_throttled_and_malformed_commits_are_isolated() {
    let server = TestServer::start(|_| {
        HashMap::from([
            (
                "/users/alice/events?per_page=100".to_string(),
                Reply::json(&format!(
                    "[{}]",
                    push_event(
                        "alice",
                        "alice/tool",
                        &[("alice", "limited"), ("alice", "broken"), ("alice", "fine")]
                    )
                )),
            ),
            (
                "/repos/alice/tool/commits/limited".to_string(),
                Reply::json(r#"{"message": "API rate limit exceeded"}"#)
                    .status(403)
                    .header("X-RateLimit-Remaining", "0")
                    .header("X-RateLimit-Reset", "99999999999"),
            ),
            (
                "/repos/alice/tool/commits/broken".to_string(),
                Reply::json(r#"{"files": [{"filename": "a.py"}]}"#),
            ),
            (
                "/repos/alice/tool/commits/fine".to_string(),
                Reply::json(r#"{"files": [{"filename": "Main.java", "additions": 4, "deletions": 4}]}"#),
            ),
        ])
    })
    .await;

    let client = server.client(Credentials::new("alice", "token"));
    let outcome = aggregator(client).run("alice").await.unwrap();

    assert_eq!(
        outcome.report.get("Java"),
        Some(&LanguageStat { added: 4, deleted: 4 })
    );
    assert_eq!(outcome.failures.len(), 2);

    let error_for = |sha: &str| {
        outcome
            .failures
            .iter()
            .find(|f| f.sha == sha)
            .map(|f| f.error.clone())
            .unwrap_or_default()
    };
    assert!(error_for("limited").contains("rate limited"));
    assert!(error_for("broken").contains("malformed response"));

    // A reset far beyond max_wait is not waited for, so each commit is requested once
    let commit_requests = server
        .targets()
        .into_iter()
        .filter(|t| t.contains("/commits/"))
        .count();
    assert_eq!(commit_requests, 3);
}
