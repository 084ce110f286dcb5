//! End-to-end scenarios against an in-memory site
//!
//! A fake `Fetcher` serves fixed pages so every run is deterministic and
//! fast, and counts the requests each path received.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wayfinder::config::{parse_config, Config};
use wayfinder::fetch::{FetchError, FetchResponse, Fetcher};
use wayfinder::graph::NodeKind;
use wayfinder::synth::{RequirementKind, Termination, TriggerPattern};
use wayfinder::{CrawlReport, CrawlRun, RunStatus, StopReason, UrlKey};

const HOST: &str = "https://shop.test";

#[derive(Clone)]
enum Route {
    Html(String),
    Status(u16),
    /// Never answers within a test's lifetime
    Hang,
}

/// In-memory site keyed by path
struct FakeSite {
    routes: HashMap<String, Route>,
    hits: Mutex<HashMap<String, usize>>,
    /// Fetches currently in progress and the highest value seen
    active: AtomicUsize,
    peak: AtomicUsize,
    latency: Duration,
}

impl FakeSite {
    fn new(routes: &[(&str, Route)]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(path, route)| (path.to_string(), route.clone()))
                .collect(),
            hits: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn hits(&self, path: &str) -> usize {
        self.hits.lock().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for FakeSite {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchError> {
        *self.hits.lock().entry(url.path().to_string()).or_insert(0) += 1;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let route = self.routes.get(url.path()).cloned();
        if matches!(route, Some(Route::Hang)) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match route {
            Some(Route::Html(body)) => Ok(FetchResponse {
                requested_url: url.clone(),
                final_url: url.clone(),
                status: 200,
                headers: vec![("content-type".to_string(), "text/html".to_string())],
                body,
                elapsed_ms: 1,
                redirects: vec![],
            }),
            Some(Route::Status(code)) => {
                Err(FetchError::from_status(code).unwrap_or_else(|| FetchError::Other("bad status".into())))
            }
            Some(Route::Hang) => Err(FetchError::Timeout),
            None => Err(FetchError::Http4xx(404)),
        }
    }
}

fn page(title: &str, body: &str) -> Route {
    Route::Html(format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, body
    ))
}

fn key(path: &str) -> UrlKey {
    UrlKey::parse(&format!("{}{}", HOST, path)).unwrap()
}

/// Creates a test configuration; `extra` is appended to the `[crawl]` table
fn create_test_config(max_pages: u32, extra: &str) -> Config {
    parse_config(&format!(
        r#"
[crawl]
entry-urls = ["{}/home"]
max-depth = 5
max-pages = {}
max-flow-length = 8
worker-count = 2
per-host-concurrency = 2
global-rate-limit-per-sec = 1000.0
retry-budget = 2
retry-base-delay-ms = 1
respect-robots-txt = false
{}

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/bot"
contact-email = "qa@example.com"
"#,
        HOST, max_pages, extra
    ))
    .expect("Failed to parse test config")
}

/// The three-page site: home links to contact and about, about links home
fn three_page_site(contact: Route) -> FakeSite {
    FakeSite::new(&[
        (
            "/home",
            page("Home", r#"<a href="/contact">Contact</a> <a href="/about">About</a>"#),
        ),
        ("/about", page("About", r#"<a href="/home">Home</a>"#)),
        ("/contact", contact),
    ])
}

fn contact_page() -> Route {
    page(
        "Contact",
        r#"<form method="post" action="/contact/thanks">
             <label for="email">Email</label>
             <input type="email" id="email" name="email" required>
             <input type="text" name="message">
             <button type="submit">Send</button>
           </form>"#,
    )
}

async fn crawl(config: Config, site: Arc<FakeSite>) -> CrawlReport {
    CrawlRun::new(config)
        .expect("Failed to create crawl run")
        .with_fetcher(site)
        .execute()
        .await
        .expect("Crawl should produce a report")
}

fn assert_conserved(report: &CrawlReport) {
    let counts = &report.frontier.counts;
    assert!(report.frontier.conserved);
    assert_eq!(
        counts.done + counts.failed + counts.queued + counts.in_flight,
        counts.total
    );
}

#[tokio::test]
async fn test_three_page_site() {
    let site = Arc::new(three_page_site(contact_page()));
    let report = crawl(create_test_config(50, ""), site.clone()).await;

    assert_eq!(report.status(), RunStatus::Completed);
    assert_conserved(&report);
    assert_eq!(report.frontier.counts.done, 3);

    assert_eq!(report.graph.pages, 3);
    assert_eq!(report.graph.link_edges, 3);
    assert_eq!(report.graph.form_edges, 1);

    // Each page is fetched exactly once
    for path in ["/home", "/about", "/contact"] {
        assert_eq!(site.hits(path), 1, "{} fetched more than once", path);
    }

    assert_eq!(report.flows.len(), 2);

    let cyclic = report
        .flows
        .iter()
        .find(|flow| flow.cyclic)
        .expect("about links back home");
    assert_eq!(cyclic.pattern, TriggerPattern::Navigation);
    assert_eq!(cyclic.termination, Termination::Cycle);
    let path: Vec<&UrlKey> = std::iter::once(&cyclic.steps[0].from)
        .chain(cyclic.steps.iter().map(|step| &step.to))
        .collect();
    assert_eq!(path, vec![&key("/home"), &key("/about"), &key("/home")]);

    let form_flow = report
        .flows
        .iter()
        .find(|flow| flow.pattern == TriggerPattern::FormDriven)
        .expect("contact form yields a form-driven flow");
    assert_eq!(form_flow.steps[0].from, key("/home"));
    assert_eq!(form_flow.steps[0].to, key("/contact"));

    let requirements: Vec<_> = report.requirements_for(&form_flow.id).collect();
    assert_eq!(requirements.len(), 2);
    assert_eq!(requirements[0].kind, RequirementKind::HappyPath);
    assert!(matches!(
        &requirements[1].kind,
        RequirementKind::MissingField { field, .. } if field == "email"
    ));
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_failed_page_after_retry_budget() {
    let site = Arc::new(three_page_site(Route::Status(503)));
    let report = crawl(create_test_config(50, ""), site.clone()).await;

    // First attempt plus two retries
    assert_eq!(site.hits("/contact"), 3);
    assert_eq!(report.frontier.retries, 2);

    // The entry URL succeeded, so the run itself did not fail
    assert_eq!(report.status(), RunStatus::Completed);
    assert_conserved(&report);
    assert_eq!(report.frontier.counts.failed, 1);
    assert_eq!(report.frontier.failures[0].key, key("/contact"));
    assert_eq!(report.frontier.failure_reasons.get("http5xx"), Some(&1));

    // No node for the failed page, only an edge into the failed sink
    assert_eq!(report.graph.pages, 2);
    assert!(report.pages.iter().all(|page| page.key != key("/contact")));
    assert_eq!(report.graph.failed_edges, 1);

    let failed_flow = report
        .flows
        .iter()
        .find(|flow| flow.termination == Termination::Failed)
        .expect("a flow ends at the failed sink");
    let last = failed_flow.steps.last().unwrap();
    assert_eq!(last.from, key("/home"));
    assert_eq!(last.to_kind, NodeKind::Failed);
}

#[tokio::test]
async fn test_max_pages_leaves_entries_queued() {
    let site = Arc::new(three_page_site(contact_page()));
    let report = crawl(create_test_config(1, ""), site.clone()).await;

    assert_eq!(report.status(), RunStatus::Partial(StopReason::MaxPages));
    assert_conserved(&report);
    assert_eq!(report.frontier.counts.done, 1);
    assert_eq!(report.frontier.counts.queued, 2);
    assert_eq!(report.frontier.unvisited.len(), 2);
    assert!(report.frontier.unvisited.contains(&key("/about")));
    assert_eq!(site.hits("/about"), 0);

    // Requirements are still emitted for what was discovered
    assert_eq!(report.graph.pages, 1);
    assert!(!report.flows.is_empty());
    assert!(!report.requirements.is_empty());

    // Targets left queued are not mistaken for external sites
    assert_eq!(report.graph.external_edges, 0);
    assert_eq!(report.graph.unvisited_edges, 2);
    assert_eq!(report.flows.len(), 2);
    for flow in &report.flows {
        assert_eq!(flow.termination, Termination::Unvisited);
        assert_eq!(flow.steps[0].to_kind, NodeKind::Unvisited);
    }
    let about_role = report
        .requirements
        .iter()
        .find(|r| r.kind == RequirementKind::TerminalRole && r.title.contains("/about"))
        .expect("terminal role for /about");
    assert!(about_role.title.ends_with("(not visited due to crawl bound)"));
    assert!(about_role
        .assertions
        .iter()
        .all(|a| !a.contains("external destination")));
}

#[tokio::test]
async fn test_cancellation_reports_in_flight() {
    let site = Arc::new(FakeSite::new(&[
        (
            "/home",
            page("Home", r#"<a href="/slow">Slow</a> <a href="/about">About</a>"#),
        ),
        ("/about", page("About", "")),
        ("/slow", Route::Hang),
    ]));

    let run = CrawlRun::new(create_test_config(50, ""))
        .unwrap()
        .with_fetcher(site.clone());
    let token = run.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), run.execute())
        .await
        .expect("Cancelled run should finish promptly")
        .expect("Cancelled run still produces a report");

    assert_eq!(report.status(), RunStatus::Partial(StopReason::Cancelled));
    assert_conserved(&report);
    assert_eq!(report.frontier.in_flight_at_cutoff, vec![key("/slow")]);
    assert_eq!(report.graph.pages, 2);
}

#[tokio::test]
async fn test_wall_clock_budget() {
    let site = Arc::new(FakeSite::new(&[
        ("/home", page("Home", r#"<a href="/slow">Slow</a>"#)),
        ("/slow", Route::Hang),
    ]));

    let config = create_test_config(50, "wall-clock-budget-secs = 1");
    let report = tokio::time::timeout(Duration::from_secs(10), crawl(config, site))
        .await
        .expect("Wall-clock budget should stop the run");

    assert_eq!(report.status(), RunStatus::Partial(StopReason::WallClock));
    assert_conserved(&report);
    assert_eq!(report.frontier.counts.in_flight, 1);
}

#[tokio::test]
async fn test_per_host_concurrency_cap() {
    let links: String = (0..6)
        .map(|i| format!(r#"<a href="/item/{}">Item {}</a>"#, i, i))
        .collect();
    let mut routes = vec![("/home".to_string(), page("Home", &links))];
    for i in 0..6 {
        routes.push((format!("/item/{}", i), page("Item", "")));
    }
    let routes: Vec<(&str, Route)> = routes
        .iter()
        .map(|(path, route)| (path.as_str(), route.clone()))
        .collect();
    let site = Arc::new(FakeSite::new(&routes).with_latency(Duration::from_millis(20)));

    let mut config = create_test_config(50, "batch-size = 1");
    config.crawl.worker_count = 4;
    config.crawl.per_host_concurrency = 1;
    let report = crawl(config, site.clone()).await;

    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(report.frontier.counts.done, 7);
    assert_eq!(site.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_flow_length_is_bounded_on_dense_graph() {
    // Every page links to every other page
    let paths: Vec<String> = (0..5).map(|i| format!("/p{}", i)).collect();
    let links: String = paths
        .iter()
        .map(|path| format!(r#"<a href="{}">{}</a>"#, path, path))
        .collect();
    let mut routes = vec![("/home", page("Home", &links))];
    for path in &paths {
        routes.push((path.as_str(), page("Page", &links)));
    }
    let site = Arc::new(FakeSite::new(&routes));

    let max_flow_length = 3;
    let mut config = create_test_config(50, "max-flows = 10000");
    config.crawl.max_flow_length = max_flow_length;
    let report = crawl(config, site).await;

    assert_eq!(report.graph.pages, 6);
    assert!(!report.flows.is_empty());
    for flow in &report.flows {
        assert!(
            flow.len() <= max_flow_length as usize + 1,
            "{} has {} steps",
            flow.id,
            flow.len()
        );
    }
    assert!(report
        .flows
        .iter()
        .any(|flow| flow.termination == Termination::LengthCap));
}

#[tokio::test]
async fn test_independent_runs_in_one_process() {
    let first = Arc::new(three_page_site(contact_page()));
    let second = Arc::new(three_page_site(Route::Status(503)));

    let (a, b) = tokio::join!(
        crawl(create_test_config(50, ""), first),
        crawl(create_test_config(50, ""), second)
    );

    assert_eq!(a.graph.pages, 3);
    assert_eq!(b.graph.pages, 2);
    assert_eq!(a.frontier.counts.failed, 0);
    assert_eq!(b.frontier.counts.failed, 1);
}
