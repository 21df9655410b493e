//! End-to-end tests for menu-ocr.
//!
//! Rasterisation is replaced by an in-memory [`PageRasterizer`] so no pdfium
//! library is needed. The extraction service is either a scripted
//! [`MenuExtractor`] or the real [`OpenRouterClient`] pointed at an in-process
//! axum server that mimics the chat-completions endpoint.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use image::{DynamicImage, RgbImage};
use menu_ocr::pipeline::llm::ExtractorError;
use menu_ocr::{
    extract_image, extract_menu, extraction_stream, run_pipeline, ExtractionConfig,
    ExtractionProgressCallback, LoaderConfig, MenuExtractor, MenuOcrError, OpenRouterClient,
    PageError, PageRasterizer,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("menu_ocr=debug"))
        .with_test_writer()
        .try_init();
}

/// A file that passes the `%PDF` magic check. Its body is never parsed
/// because the rasterizer is mocked.
fn fake_pdf() -> NamedTempFile {
    init_tracing();
    let mut f = tempfile::Builder::new()
        .prefix("dinner-menu")
        .suffix(".pdf")
        .tempfile()
        .unwrap();
    f.write_all(b"%PDF-1.4\n%mock\n").unwrap();
    f
}

fn item(name: &str, price: f64) -> Value {
    json!({
        "name": name,
        "description": format!("House {name}"),
        "price": price,
        "tags": ["signature"],
        "category": "Mains",
        "ingredients": ["rice", "egg"],
        "dietaryTags": [],
        "spicinessLevel": 2
    })
}

/// A chat-completion reply whose content is the JSON-encoded payload.
fn completion(items: Vec<Value>) -> Value {
    json!({
        "id": "gen-test",
        "model": "qwen/qwen3-vl-30b-a3b-instruct",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": json!({ "menuItems": items }).to_string()
            },
            "finish_reason": "stop"
        }]
    })
}

/// Serves a fixed page count and blank images, counting every call.
#[derive(Default)]
struct MockRasterizer {
    pages: Option<usize>,
    /// 1-indexed pages whose render fails.
    broken_pages: Vec<usize>,
    count_calls: AtomicUsize,
    render_calls: AtomicUsize,
}

impl MockRasterizer {
    fn with_pages(pages: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: Some(pages),
            ..Self::default()
        })
    }

    fn with_broken_pages(pages: usize, broken_pages: Vec<usize>) -> Arc<Self> {
        Arc::new(Self {
            pages: Some(pages),
            broken_pages,
            ..Self::default()
        })
    }

    fn unreadable() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PageRasterizer for MockRasterizer {
    fn page_count(&self, pdf_path: &Path) -> Result<usize, MenuOcrError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.pages.ok_or_else(|| MenuOcrError::Inspection {
            path: pdf_path.to_path_buf(),
            detail: "corrupt cross-reference table".into(),
        })
    }

    fn render_page(&self, _pdf_path: &Path, page: usize) -> Result<DynamicImage, PageError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if self.broken_pages.contains(&page) {
            return Err(PageError::Rasterization {
                page,
                detail: "no image returned".into(),
            });
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::new(8, 8)))
    }
}

/// Replies from a script, one entry per call, in call order.
struct ScriptedExtractor {
    replies: Mutex<VecDeque<Result<Value, ExtractorError>>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    fn new(replies: Vec<Result<Value, ExtractorError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MenuExtractor for ScriptedExtractor {
    async fn extract(&self, image_data_url: &str) -> Result<Value, ExtractorError> {
        assert!(image_data_url.starts_with("data:image/"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(completion(vec![])))
    }
}

fn config(
    rasterizer: Arc<dyn PageRasterizer>,
    extractor: Arc<dyn MenuExtractor>,
) -> ExtractionConfig {
    ExtractionConfig::builder()
        .api_key("sk-or-test")
        .rasterizer(rasterizer)
        .extractor(extractor)
        .build()
        .unwrap()
}

fn loader(dir: &TempDir) -> LoaderConfig {
    LoaderConfig {
        database_dir: dir.path().to_path_buf(),
        table_name: Some("dinner_menu".into()),
        ..LoaderConfig::default()
    }
}

// ── Mock chat-completions endpoint ───────────────────────────────────────────

#[derive(Default)]
struct MockService {
    calls: AtomicUsize,
    /// 1-indexed call numbers that answer HTTP 500.
    fail_calls: Vec<usize>,
    seen: Mutex<Vec<(Option<String>, Value)>>,
}

async fn chat_completions(
    State(svc): State<Arc<MockService>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let call = svc.calls.fetch_add(1, Ordering::SeqCst) + 1;
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    svc.seen.lock().unwrap().push((auth, body));

    if svc.fail_calls.contains(&call) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "upstream exploded", "code": 500 } })),
        );
    }
    (
        StatusCode::OK,
        Json(completion(vec![item(&format!("Dish {call}"), 9.5)])),
    )
}

/// Start the mock on an ephemeral port and return its endpoint URL.
async fn spawn_mock(svc: Arc<MockService>) -> String {
    let app = Router::new()
        .route("/api/v1/chat/completions", post(chat_completions))
        .with_state(svc);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1/chat/completions")
}

// ── Stream shape ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_result_per_page_in_order() {
    let pdf = fake_pdf();
    let raster = MockRasterizer::with_pages(4);
    let extractor = ScriptedExtractor::new(vec![
        Ok(completion(vec![item("Bibimbap", 12.0), item("Japchae", 11.0)])),
        Ok(completion(vec![])),
        Ok(json!({ "choices": [] })),
        Ok(completion(vec![item("Tteokbokki", 8.0)])),
    ]);

    let out = extract_menu(
        pdf.path().to_str().unwrap(),
        &config(raster.clone(), extractor.clone()),
    )
    .await
    .unwrap();

    let pages: Vec<usize> = out.results.iter().map(|r| r.page_number).collect();
    assert_eq!(pages, vec![1, 2, 3, 4]);
    for r in &out.results {
        assert_eq!(r.total_pages, 4);
        assert_eq!(r.item_count, r.menu_items.len());
        assert!(
            r.error.is_some() ^ r.menu_data.is_some(),
            "page {} must have exactly one of error/menu_data",
            r.page_number
        );
        for it in &r.menu_items {
            it.validate().unwrap();
        }
    }
    assert_eq!(out.results[0].item_count, 2);
    assert!(out.results[1].is_success());
    assert_eq!(out.stats.total_pages, 4);
    assert_eq!(out.stats.failed_pages, 1);
    assert_eq!(out.stats.total_items, 3);
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 4);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn empty_choices_records_exact_message() {
    let pdf = fake_pdf();
    let raw = json!({ "id": "gen-empty", "choices": [] });
    let out = extract_menu(
        pdf.path().to_str().unwrap(),
        &config(
            MockRasterizer::with_pages(1),
            ScriptedExtractor::new(vec![Ok(raw.clone())]),
        ),
    )
    .await
    .unwrap();

    let r = &out.results[0];
    assert_eq!(r.error.as_deref(), Some("No valid response from OpenRouter"));
    assert_eq!(r.ocr_response.as_ref(), Some(&raw));
    assert!(r.menu_data.is_none());
    assert_eq!(r.item_count, 0);
}

#[tokio::test]
async fn stream_is_lazy() {
    let pdf = fake_pdf();
    let raster = MockRasterizer::with_pages(3);
    let extractor = ScriptedExtractor::new(vec![]);

    let mut stream = extraction_stream(
        pdf.path().to_str().unwrap(),
        &config(raster.clone(), extractor.clone()),
    )
    .await
    .unwrap();
    assert_eq!(raster.count_calls.load(Ordering::SeqCst), 1);
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 0);

    let first = stream.next().await.unwrap();
    assert_eq!(first.page_number, 1);
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 1);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);

    // Dropping the stream early processes nothing further.
    drop(stream);
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_page_pdf_yields_nothing() {
    let pdf = fake_pdf();
    let out = extract_menu(
        pdf.path().to_str().unwrap(),
        &config(
            MockRasterizer::with_pages(0),
            ScriptedExtractor::new(vec![]),
        ),
    )
    .await
    .unwrap();
    assert!(out.results.is_empty());
    assert_eq!(out.stats.total_pages, 0);
    assert_eq!(out.stats.total_items, 0);
}

#[tokio::test]
async fn render_failure_only_fails_that_page() {
    let pdf = fake_pdf();
    let raster = MockRasterizer::with_broken_pages(3, vec![2]);
    let extractor = ScriptedExtractor::new(vec![
        Ok(completion(vec![item("Galbi", 25.0)])),
        Ok(completion(vec![item("Hotteok", 4.5)])),
    ]);

    let out = extract_menu(
        pdf.path().to_str().unwrap(),
        &config(raster.clone(), extractor.clone()),
    )
    .await
    .unwrap();

    assert_eq!(out.results.len(), 3);
    let [p1, p2, p3] = [&out.results[0], &out.results[1], &out.results[2]];
    assert!(p1.is_success());
    assert!(p3.is_success());
    assert_eq!(p1.menu_items[0].name, "Galbi");
    assert_eq!(p3.menu_items[0].name, "Hotteok");

    assert_eq!(
        p2.error.as_deref(),
        Some("Could not extract page 2 from PDF: no image returned")
    );
    assert!(p2.ocr_response.is_none());
    assert!(p2.menu_data.is_none());
    assert_eq!(p2.item_count, 0);

    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 3);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_credential_fails_before_rasterisation() {
    let pdf = fake_pdf();
    let raster = MockRasterizer::with_pages(3);
    let extractor = ScriptedExtractor::new(vec![]);
    let config = ExtractionConfig {
        rasterizer: Some(raster.clone() as Arc<dyn PageRasterizer>),
        extractor: Some(extractor.clone() as Arc<dyn MenuExtractor>),
        ..ExtractionConfig::default()
    };

    let err = extract_menu(pdf.path().to_str().unwrap(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, MenuOcrError::MissingCredential));
    assert!(err.is_configuration());
    assert_eq!(raster.count_calls.load(Ordering::SeqCst), 0);
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 0);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_pdf_selected() {
    let err = extract_menu(
        "",
        &config(
            MockRasterizer::with_pages(1),
            ScriptedExtractor::new(vec![]),
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MenuOcrError::NoPdfSelected));
}

#[tokio::test]
async fn inspection_failure_writes_nothing() {
    let pdf = fake_pdf();
    let db_dir = TempDir::new().unwrap();
    let raster = MockRasterizer::unreadable();
    let extractor = ScriptedExtractor::new(vec![]);
    let loader = loader(&db_dir);

    let err = run_pipeline(
        pdf.path().to_str().unwrap(),
        &config(raster.clone(), extractor.clone()),
        &loader,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, MenuOcrError::Inspection { .. }), "got {err:?}");
    assert_eq!(raster.render_calls.load(Ordering::SeqCst), 0);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    assert!(!loader.database_path().exists(), "loader must not run");
}

// ── Real client against the mock endpoint ────────────────────────────────────

#[tokio::test]
async fn http_500_on_page_two_only_fails_that_page() {
    let svc = Arc::new(MockService {
        fail_calls: vec![2],
        ..MockService::default()
    });
    let endpoint = spawn_mock(svc.clone()).await;
    let pdf = fake_pdf();

    let config = ExtractionConfig::builder()
        .api_key("sk-or-test")
        .endpoint(endpoint)
        .rasterizer(MockRasterizer::with_pages(3))
        .build()
        .unwrap();

    let out = extract_menu(pdf.path().to_str().unwrap(), &config)
        .await
        .unwrap();

    assert_eq!(out.results.len(), 3);
    let [p1, p2, p3] = [&out.results[0], &out.results[1], &out.results[2]];
    assert!(p1.is_success());
    assert!(p3.is_success());
    assert_eq!(p1.menu_items[0].name, "Dish 1");
    assert_eq!(p3.menu_items[0].name, "Dish 3");

    let e = p2.error.as_deref().unwrap();
    assert!(e.contains("500"), "got: {e}");
    assert!(p2.menu_items.is_empty());
    assert!(p2.ocr_response.is_none());
    assert_eq!(svc.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn request_carries_schema_and_credential() {
    let svc = Arc::new(MockService::default());
    let endpoint = spawn_mock(svc.clone()).await;

    let client = OpenRouterClient::new(
        endpoint,
        "qwen/qwen3-vl-30b-a3b-instruct",
        "sk-or-secret",
        "Extract the menu.",
        None,
    )
    .unwrap();
    let reply = client
        .extract("data:image/jpeg;base64,AAAA")
        .await
        .unwrap();
    assert!(reply["choices"][0]["message"]["content"].is_string());

    let seen = svc.seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-or-secret"));
    assert_eq!(body["model"], "qwen/qwen3-vl-30b-a3b-instruct");
    assert_eq!(body["provider"]["require_parameters"], true);
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["response_format"]["json_schema"]["strict"], true);

    let content = &body["messages"][0]["content"];
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(content[0]["type"], "text");
    assert_eq!(content[0]["text"], "Extract the menu.");
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(
        content[1]["image_url"]["url"],
        "data:image/jpeg;base64,AAAA"
    );
}

#[tokio::test]
async fn http_error_keeps_status_and_body() {
    let svc = Arc::new(MockService {
        fail_calls: vec![1],
        ..MockService::default()
    });
    let endpoint = spawn_mock(svc).await;
    let client =
        OpenRouterClient::new(endpoint, "m", "k", "p", None).unwrap();

    match client.extract("data:image/jpeg;base64,AAAA").await {
        Err(ExtractorError::Http { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("upstream exploded"));
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

// ── Loading ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_loads_pages_and_items() {
    let pdf = fake_pdf();
    let db_dir = TempDir::new().unwrap();
    let loader = loader(&db_dir);
    let extractor = ScriptedExtractor::new(vec![
        Ok(completion(vec![item("Galbi", 25.0), item("Naengmyeon", 13.0)])),
        Err(ExtractorError::Transport("connection reset".into())),
        Ok(completion(vec![item("Hotteok", 4.5)])),
    ]);

    let info = run_pipeline(
        pdf.path().to_str().unwrap(),
        &config(MockRasterizer::with_pages(3), extractor),
        &loader,
    )
    .await
    .unwrap();

    assert_eq!(info.table, "dinner_menu");
    assert_eq!(info.items_table, "dinner_menu__menu_items");
    assert_eq!(info.pages_loaded, 3);
    assert_eq!(info.failed_pages, 1);
    assert_eq!(info.items_loaded, 3);
    assert_eq!(info.database_path, db_dir.path().join("mandu.db"));

    let conn = Connection::open(&info.database_path).unwrap();
    let pages: Vec<(i64, Option<String>)> = conn
        .prepare("SELECT page_number, error FROM dinner_menu ORDER BY page_number")
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages[0].1.is_none());
    assert!(pages[1].1.as_deref().unwrap().contains("connection reset"));

    let names: Vec<String> = conn
        .prepare("SELECT name FROM dinner_menu__menu_items ORDER BY _parent_page_number, _list_idx")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["Galbi", "Naengmyeon", "Hotteok"]);
}

#[tokio::test]
async fn default_table_comes_from_file_name() {
    let pdf = fake_pdf();
    let db_dir = TempDir::new().unwrap();
    let loader = LoaderConfig {
        database_dir: db_dir.path().to_path_buf(),
        ..LoaderConfig::default()
    };

    let info = run_pipeline(
        pdf.path().to_str().unwrap(),
        &config(
            MockRasterizer::with_pages(1),
            ScriptedExtractor::new(vec![]),
        ),
        &loader,
    )
    .await
    .unwrap();
    assert!(info.table.starts_with("dinner_menu"), "got {}", info.table);
}

// ── Progress callbacks ───────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ExtractionProgressCallback for Recorder {
    fn on_run_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start {total}"));
    }
    fn on_page_start(&self, page: usize, _total: usize) {
        self.events.lock().unwrap().push(format!("page {page}"));
    }
    fn on_page_complete(&self, page: usize, _total: usize, items: usize) {
        self.events.lock().unwrap().push(format!("ok {page} {items}"));
    }
    fn on_page_error(&self, page: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err {page}"));
    }
    fn on_run_complete(&self, total: usize, ok: usize) {
        self.events.lock().unwrap().push(format!("done {ok}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_page_order() {
    let pdf = fake_pdf();
    let recorder = Arc::new(Recorder::default());
    let config = ExtractionConfig::builder()
        .api_key("sk-or-test")
        .rasterizer(MockRasterizer::with_pages(2))
        .extractor(ScriptedExtractor::new(vec![
            Ok(json!({ "choices": [] })),
            Ok(completion(vec![item("Mandu", 7.0)])),
        ]))
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    extract_menu(pdf.path().to_str().unwrap(), &config)
        .await
        .unwrap();

    assert_eq!(
        *recorder.events.lock().unwrap(),
        vec!["start 2", "page 1", "err 1", "page 2", "ok 2 1", "done 1/2"]
    );
}

// ── Standalone image ─────────────────────────────────────────────────────────

#[tokio::test]
async fn image_file_is_extracted_as_single_page() {
    let mut img = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    img.write_all(b"\x89PNG\r\n\x1a\nnot really").unwrap();

    let config = config(
        MockRasterizer::with_pages(1),
        ScriptedExtractor::new(vec![Ok(completion(vec![item("Kimbap", 6.0)]))]),
    );
    let r = extract_image(img.path(), &config).await.unwrap();
    assert_eq!((r.page_number, r.total_pages), (1, 1));
    assert_eq!(r.menu_items[0].name, "Kimbap");
}

#[tokio::test]
async fn missing_image_is_fatal() {
    let config = config(
        MockRasterizer::with_pages(1),
        ScriptedExtractor::new(vec![]),
    );
    let err = extract_image("/definitely/not/here.jpg", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, MenuOcrError::ImageRead { .. }));
}
