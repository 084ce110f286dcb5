//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test the HTTP
//! fetcher and the full crawl-and-synthesis cycle end-to-end.

use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wayfinder::config::{parse_config, Config};
use wayfinder::fetch::{FetchError, Fetcher, HttpFetcher};
use wayfinder::policy::SkipReason;
use wayfinder::report::write_json;
use wayfinder::synth::{Termination, TriggerPattern};
use wayfinder::{CrawlRun, RunStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling `entry_url`
fn create_test_config(entry_url: &str, respect_robots: bool) -> Config {
    parse_config(&format!(
        r#"
[crawl]
entry-urls = ["{}"]
max-depth = 3
max-pages = 50
max-flow-length = 6
worker-count = 2
per-host-concurrency = 2
global-rate-limit-per-sec = 100.0
retry-budget = 1
retry-base-delay-ms = 10
request-timeout-secs = 5
respect-robots-txt = {}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"
"#,
        entry_url, respect_robots
    ))
    .expect("Failed to parse test config")
}

fn test_fetcher() -> HttpFetcher {
    let config = create_test_config("https://example.com/", false);
    HttpFetcher::from_config(&config.user_agent, &config.crawl).expect("Failed to build fetcher")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

#[tokio::test]
async fn test_fetcher_follows_redirects() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html("<html><head><title>New</title></head></html>"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/old", mock_server.uri())).unwrap();
    let response = test_fetcher()
        .fetch(&url, Duration::from_secs(5))
        .await
        .expect("Redirected fetch should succeed");

    assert_eq!(response.status, 200);
    assert_eq!(response.final_url.path(), "/new");
    assert_eq!(response.redirects.len(), 1);
    assert!(response.was_redirected());
    assert!(response.is_html());
    assert!(response.body.contains("<title>New</title>"));
}

#[tokio::test]
async fn test_fetcher_detects_redirect_loop() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/a", mock_server.uri())).unwrap();
    let result = test_fetcher().fetch(&url, Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::RedirectLoop(_))));
}

#[tokio::test]
async fn test_fetcher_classifies_http_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let fetcher = test_fetcher();

    let missing = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
    let error = fetcher.fetch(&missing, Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(error, FetchError::Http4xx(404));
    assert!(!error.is_retryable());

    let down = Url::parse(&format!("{}/down", mock_server.uri())).unwrap();
    let error = fetcher.fetch(&down, Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(error, FetchError::Http5xx(503));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_full_crawl_against_mock_server() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <a href="/about">About</a>
            <a href="/contact">Contact</a>
            <a href="/private/area">Private</a>
            <a href="/logo.png">Logo</a>
            <a href="https://other.example/">Elsewhere</a>
            <a href="/team">Team</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html(
            r#"<html><head><title>About</title></head><body><a href="/">Home</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/team"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/about"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html(
            r#"<html><head><title>Contact</title></head><body>
            <form id="contact" method="post" action="/contact/send">
              <label for="email">Email</label>
              <input type="email" id="email" name="email" required>
              <button type="submit">Send</button>
            </form>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&format!("{}/", base_url), true);
    let report = CrawlRun::new(config)
        .expect("Failed to create crawl run")
        .with_config_hash("test-hash")
        .execute()
        .await
        .expect("Crawl should produce a report");

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.run.config_hash.as_deref(), Some("test-hash"));

    // Home, about, contact; /team is an alias of /about
    assert_eq!(report.graph.pages, 3);
    assert!(report.graph.aliases >= 1);
    assert_eq!(report.graph.form_edges, 1);

    let frontier = &report.frontier;
    assert!(frontier.conserved);
    assert!(frontier.failures.is_empty());
    assert_eq!(frontier.counts.queued, 0);
    assert_eq!(frontier.counts.in_flight, 0);
    assert_eq!(frontier.skipped.get(&SkipReason::DeniedByRobots), Some(&1));
    assert_eq!(frontier.skipped.get(&SkipReason::StaticAsset), Some(&1));
    assert_eq!(frontier.skipped.get(&SkipReason::OutOfScope), Some(&1));

    let form_flow = report
        .flows
        .iter()
        .find(|flow| flow.pattern == TriggerPattern::FormDriven)
        .expect("Contact form should yield a form-driven flow");
    assert_eq!(report.requirements_for(&form_flow.id).count(), 2);
    assert!(report.flows.iter().any(|flow| flow.cyclic));

    // The report serializes
    let temp_dir = TempDir::new().unwrap();
    let json_path = temp_dir.path().join("flows.json");
    write_json(&report, &json_path).expect("Failed to write JSON report");
    let json = std::fs::read_to_string(&json_path).unwrap();
    assert!(json.contains("\"form_driven\""));
}

#[tokio::test]
async fn test_redirect_into_denied_path_is_not_recorded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <a href="/account">Account</a>
            </body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/account"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/logout"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/logout"))
        .respond_with(html(
            r#"<html><head><title>Signed out</title></head><body><a href="/">Home</a></body></html>"#,
        ))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(&format!("{}/", mock_server.uri()), false);
    config.scope.deny_paths = vec!["/logout".to_string()];
    let report = CrawlRun::new(config)
        .expect("Failed to create crawl run")
        .execute()
        .await
        .expect("Crawl should produce a report");

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.graph.pages, 1);
    assert!(report.pages.iter().all(|page| !page.key.as_str().ends_with("/logout")));

    let frontier = &report.frontier;
    assert!(frontier.conserved);
    assert_eq!(frontier.counts.failed, 1);
    let failure = &frontier.failures[0];
    assert!(failure.key.as_str().ends_with("/account"));
    assert!(failure.reason.contains("/logout"));
    assert!(failure.reason.contains("denied_by_config"));
    assert_eq!(frontier.failure_reasons.get("redirect_denied"), Some(&1));
    assert_eq!(frontier.skipped.get(&SkipReason::DeniedByConfig), Some(&1));

    // The link to /account leads off the crawled site
    assert_eq!(report.graph.external_edges, 1);
    assert_eq!(report.flows.len(), 1);
    assert_eq!(report.flows[0].termination, Termination::External);
    assert!(report.flows[0].steps[0].to.as_str().ends_with("/account"));
}

#[tokio::test]
async fn test_unreachable_entry_fails_run() {
    let mock_server = MockServer::start().await;

    // One attempt plus one retry
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&format!("{}/", mock_server.uri()), false);
    let report = CrawlRun::new(config)
        .expect("Failed to create crawl run")
        .execute()
        .await
        .expect("A failed run still produces a report");

    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.frontier.counts.failed, 1);
    assert_eq!(report.frontier.failure_reasons.get("http5xx"), Some(&1));
    assert_eq!(report.frontier.retries, 1);
    assert_eq!(report.graph.pages, 0);
    assert!(report.flows.is_empty());
}
