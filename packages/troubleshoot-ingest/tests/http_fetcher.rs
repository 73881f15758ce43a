//! HttpFetcher against a local axum site.
//!
//! The site serves a paginated public knowledge base, a dealer area behind a
//! cookie login, and a few misbehaving routes (flaky, down, expired session).

use axum::{
    extract::{Form, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use troubleshoot_ingest::fetchers::SessionState;
use troubleshoot_ingest::security::SiteCredentials;
use troubleshoot_ingest::stores::{MemoryRecordStore, MemoryVectorIndex};
use troubleshoot_ingest::testing::{MockClassifier, MockEmbedder, MockFetcher};
use troubleshoot_ingest::{
    AuthError, Fetcher, HttpFetcher, IngestError, PersistConfig, Pipeline, RawPage, TargetConfig,
};

const LOGIN_FORM: &str = r#"<html><body>
<form name="Logon" action="/Logon" method="post">
  <input type="hidden" name="storeId" value="0">
  <input type="hidden" name="reLogonURL" value="LogonForm">
  <input name="logonId" class="cvform">
  <input name="logonPassword" type="password" class="cvform">
  <button type="submit">Log In</button>
</form>
</body></html>"#;

#[derive(Default)]
struct Site {
    hits: Mutex<Vec<String>>,
    flaky_failures: AtomicUsize,
    form_action_rejects: AtomicBool,
}

impl Site {
    fn hit(&self, entry: String) {
        self.hits.lock().unwrap().push(entry);
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.hits().iter().filter(|h| *h == entry).count()
    }
}

type Shared = Arc<Site>;

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.contains("session=ok"))
}

async fn robots() -> &'static str {
    "User-agent: *\nDisallow: /private/\n"
}

async fn kb(
    State(site): State<Shared>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Html<String> {
    site.hit(format!("GET {uri}"));
    let page: u32 = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let next = if page < 3 {
        format!(r#"<a class="next" href="/kb?page={}">Next</a>"#, page + 1)
    } else {
        String::new()
    };
    Html(format!(
        r#"<div class="doc"><a href="/docs/{page}.pdf">Doc {page}</a></div>{next}"#
    ))
}

async fn kb_loop(State(site): State<Shared>, uri: Uri) -> Html<&'static str> {
    site.hit(format!("GET {uri}"));
    Html(r#"<div class="doc">Loop</div><a class="next" href="/kb/loop">Next</a>"#)
}

async fn flaky(State(site): State<Shared>, uri: Uri) -> Response {
    site.hit(format!("GET {uri}"));
    let failing = site
        .flaky_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Html(r#"<div class="doc">Recovered</div>"#).into_response()
}

async fn down(State(site): State<Shared>, uri: Uri) -> StatusCode {
    site.hit(format!("GET {uri}"));
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn private(State(site): State<Shared>, uri: Uri) -> Html<&'static str> {
    site.hit(format!("GET {uri}"));
    Html("<p>private</p>")
}

async fn login_form(State(site): State<Shared>, uri: Uri) -> Html<&'static str> {
    site.hit(format!("GET {uri}"));
    Html(LOGIN_FORM)
}

async fn logon(State(site): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    site.hit("POST /Logon".to_string());
    if site.form_action_rejects.load(Ordering::SeqCst) {
        return Redirect::to("/LogonForm?error=1").into_response();
    }
    finish_login(&form)
}

async fn alt_logon(State(site): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    site.hit("POST /alt/Logon".to_string());
    finish_login(&form)
}

fn finish_login(form: &HashMap<String, String>) -> Response {
    let field = |name: &str| form.get(name).map(String::as_str);
    let accepted = field("logonId") == Some("dealer")
        && field("logonPassword") == Some("secret")
        && field("storeId") == Some("10151");
    if accepted {
        ([(header::SET_COOKIE, "session=ok; Path=/")], Redirect::to("/files")).into_response()
    } else {
        Redirect::to("/LogonForm?error=1").into_response()
    }
}

async fn files(State(site): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    site.hit(format!("GET {uri}"));
    if !has_session(&headers) {
        return Redirect::to("/LogonForm").into_response();
    }
    Html(r#"<div class="doc"><a href="/docs/dealer.pdf">Dealer files</a></div>"#).into_response()
}

async fn expired(State(site): State<Shared>, uri: Uri) -> Redirect {
    site.hit(format!("GET {uri}"));
    Redirect::to("/LogonForm")
}

async fn serve(site: Shared) -> String {
    let app = Router::new()
        .route("/robots.txt", get(robots))
        .route("/kb", get(kb))
        .route("/kb/loop", get(kb_loop))
        .route("/flaky", get(flaky))
        .route("/down", get(down))
        .route("/private/doc", get(private))
        .route("/LogonForm", get(login_form))
        .route("/Logon", post(logon))
        .route("/alt/Logon", post(alt_logon))
        .route("/files", get(files))
        .route("/expired", get(expired))
        .with_state(site);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A target on the local site. `tables` holds extra TOML tables such as
/// `[login]` or `[pagination]`.
fn target(base: &str, starts: &[&str], tables: &str) -> TargetConfig {
    let starts = starts
        .iter()
        .map(|path| format!("\"{base}{path}\""))
        .collect::<Vec<_>>()
        .join(", ");
    TargetConfig::from_toml(&format!(
        r#"
name = "local-site"
brand = "SnapOne"
start_urls = [{starts}]
delay_ms = 0
max_retries = 2
respect_robots = false

{tables}

[rules]
item = "div.doc"

[rules.url]
kind = "attr"
selector = "a"
name = "href"

[rules.issue]
kind = "text"
"#
    ))
    .unwrap()
}

fn login_table(base: &str, submit_url: Option<&str>, session_file: Option<&str>) -> String {
    let mut table = format!(
        r#"[login]
login_url = "{base}/LogonForm"
form_selector = 'form[name="Logon"]'
username_field = "logonId"
password_field = "logonPassword"
username_env = "LOCAL_SITE_USERNAME"
password_env = "LOCAL_SITE_PASSWORD"
login_markers = ["logonform"]
"#
    );
    if let Some(url) = submit_url {
        table.push_str(&format!("submit_url = \"{base}{url}\"\n"));
    }
    if let Some(path) = session_file {
        table.push_str(&format!("session_file = '{path}'\n"));
    }
    table.push_str("\n[login.extra_fields]\nstoreId = \"10151\"\n");
    table
}

fn public_fetcher(target: &TargetConfig) -> HttpFetcher {
    HttpFetcher::with_credentials(target, None)
        .unwrap()
        .with_retry_backoff(Duration::from_millis(5))
}

fn dealer_fetcher(target: &TargetConfig, password: &str) -> HttpFetcher {
    HttpFetcher::with_credentials(target, Some(SiteCredentials::new("dealer", password)))
        .unwrap()
        .with_retry_backoff(Duration::from_millis(5))
}

fn save_session(path: &std::path::Path, base: &str, value: &str) {
    let mut origins = BTreeMap::new();
    origins.insert(base.to_string(), vec![("session".to_string(), value.to_string())]);
    SessionState {
        saved_at: None,
        origins,
    }
    .save(path)
    .unwrap();
}

#[tokio::test]
async fn test_pagination_follows_next_until_last_page() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let mut target = target(&base, &["/kb?page=1"], "");
    target.pagination.next_selector = Some("a.next".into());

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 3);
    assert!(outcome.failures.is_empty());
    let depths: Vec<u32> = outcome.pages.iter().map(|p| p.depth).collect();
    assert_eq!(depths, vec![0, 1, 2]);
    assert!(outcome.pages[2].url.ends_with("/kb?page=3"));
}

#[tokio::test]
async fn test_pagination_stops_at_max_pages() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let mut target = target(&base, &["/kb?page=1"], "");
    target.pagination.next_selector = Some("a.next".into());
    target.pagination.max_pages = 2;

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(site.count("GET /kb?page=3"), 0);
}

#[tokio::test]
async fn test_pagination_stops_on_repeated_url() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let mut target = target(&base, &["/kb/loop"], "");
    target.pagination.next_selector = Some("a.next".into());

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(site.count("GET /kb/loop"), 1);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let site = Shared::default();
    site.flaky_failures.store(2, Ordering::SeqCst);
    let base = serve(site.clone()).await;
    let target = target(&base, &["/flaky"], "");

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert!(outcome.pages[0].html.contains("Recovered"));
    assert_eq!(site.count("GET /flaky"), 3);
}

#[tokio::test]
async fn test_exhausted_retries_record_page_failure() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let mut target = target(&base, &["/down", "/kb?page=3"], "");
    target.max_retries = 1;

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].url.ends_with("/down"));
    assert!(outcome.failures[0].message.contains("500"));
    assert_eq!(site.count("GET /down"), 2);
}

#[tokio::test]
async fn test_robots_disallowed_path_is_skipped() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let mut target = target(&base, &["/private/doc", "/kb?page=3"], "");
    target.respect_robots = true;

    let outcome = public_fetcher(&target).fetch_target(&target).await.unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].message.contains("robots.txt"));
    assert_eq!(site.count("GET /private/doc"), 0);
}

#[tokio::test]
async fn test_login_through_form_action() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let target = target(&base, &["/files"], &login_table(&base, Some("/alt/Logon"), None));

    let outcome = dealer_fetcher(&target, "secret")
        .fetch_target(&target)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert!(outcome.pages[0].html.contains("Dealer files"));
    assert_eq!(site.count("POST /Logon"), 1);
    assert_eq!(site.count("POST /alt/Logon"), 0);
}

#[tokio::test]
async fn test_login_falls_back_to_submit_url() {
    let site = Shared::default();
    site.form_action_rejects.store(true, Ordering::SeqCst);
    let base = serve(site.clone()).await;
    let target = target(&base, &["/files"], &login_table(&base, Some("/alt/Logon"), None));

    let outcome = dealer_fetcher(&target, "secret")
        .fetch_target(&target)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    let posts: Vec<String> = site
        .hits()
        .into_iter()
        .filter(|h| h.starts_with("POST"))
        .collect();
    assert_eq!(posts, vec!["POST /Logon", "POST /alt/Logon"]);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let target = target(&base, &["/files"], &login_table(&base, Some("/alt/Logon"), None));

    let err = dealer_fetcher(&target, "wrong")
        .fetch_target(&target)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Auth(AuthError::LoginRejected { attempts: 2, .. })
    ));
    assert_eq!(site.count("GET /files"), 0);
}

#[tokio::test]
async fn test_saved_session_is_reused() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    save_session(&path, &base, "ok");
    let target = target(
        &base,
        &["/files"],
        &login_table(&base, None, Some(path.to_str().unwrap())),
    );

    let outcome = dealer_fetcher(&target, "secret")
        .fetch_target(&target)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(site.count("GET /LogonForm"), 0);
    assert_eq!(site.count("POST /Logon"), 0);
}

#[tokio::test]
async fn test_stale_session_falls_back_to_login() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    save_session(&path, &base, "stale");
    let target = target(
        &base,
        &["/files"],
        &login_table(&base, None, Some(path.to_str().unwrap())),
    );

    let outcome = dealer_fetcher(&target, "secret")
        .fetch_target(&target)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(site.count("POST /Logon"), 1);

    let saved = SessionState::load(&path).unwrap().unwrap();
    assert_eq!(
        saved.origins.get(&base),
        Some(&vec![("session".to_string(), "ok".to_string())])
    );
}

#[tokio::test]
async fn test_redirect_to_login_marks_session_expired() {
    let site = Shared::default();
    let base = serve(site.clone()).await;
    let target = target(
        &base,
        &["/files", "/expired"],
        &login_table(&base, None, None),
    );

    let outcome = dealer_fetcher(&target, "secret")
        .fetch_target(&target)
        .await
        .unwrap();

    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].url.ends_with("/expired"));
    assert!(outcome.failures[0].message.contains("session expired"));
    assert_eq!(site.count("GET /expired"), 1);
}

#[tokio::test]
async fn test_unreachable_login_page_skips_only_that_target() {
    // Nothing listens on the discard port.
    let dealer = target(
        "http://127.0.0.1:9",
        &["/files"],
        &login_table("http://127.0.0.1:9", None, None),
    );
    let dealer_fetcher = dealer_fetcher(&dealer, "secret");

    let mut kb = target("https://kb.example.com", &["/kb"], "");
    kb.name = "public-kb".into();
    let kb_fetcher = MockFetcher::new().with_page(RawPage::new(
        "https://kb.example.com/kb",
        r#"<div class="doc"><a href="/docs/1.pdf">Amplifier protect mode</a></div>"#,
    ));

    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(64);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();
    let pipeline = Pipeline::new(&classifier, &embedder, &records, &index)
        .with_persist_config(PersistConfig::default().with_batch_pause(Duration::ZERO));

    let runs: Vec<(&TargetConfig, &dyn Fetcher)> =
        vec![(&dealer, &dealer_fetcher), (&kb, &kb_fetcher)];
    let finished = pipeline.run_all(&runs).await.unwrap();

    assert_eq!(finished.len(), 2);
    match &finished[0].result {
        Err(e @ IngestError::Auth(AuthError::Request(_))) => assert!(!e.is_fatal()),
        other => panic!("unexpected result: {:?}", other),
    }
    let report = finished[1].report().expect("second target runs");
    assert_eq!(report.persisted(), 1);
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_fatal_error_stops_remaining_targets() {
    let mut broken = target("https://kb.example.com", &["/kb"], "");
    broken.rules.item = "div[".into();
    let kb = target("https://kb.example.com", &["/kb"], "");
    let broken_fetcher = MockFetcher::new();
    let kb_fetcher = MockFetcher::new();

    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(64);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();
    let pipeline = Pipeline::new(&classifier, &embedder, &records, &index);

    let runs: Vec<(&TargetConfig, &dyn Fetcher)> =
        vec![(&broken, &broken_fetcher), (&kb, &kb_fetcher)];
    let err = pipeline.run_all(&runs).await.unwrap_err();

    assert!(matches!(err, IngestError::Config(_)));
    assert!(kb_fetcher.calls().is_empty());
}
