use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use folio_core::index::{DocId, Document, PageNumber, Posting};
use folio_core::source::TextFileSource;
use folio_core::store::{DocumentCatalog, IndexStats, IndexStore, MemoryStore};
use folio_core::{Engine, FolioConfig, StoreError};
use folio_server::{build_app, open_state, AppState, ServerOptions};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn app() -> (Router, TempDir) {
    let dir = tempdir().unwrap();
    let state = open_state(&ServerOptions { data_dir: dir.path().to_path_buf(), config: None, in_memory: true }).unwrap();
    (build_app(state), dir)
}

async fn send(app: &Router, method: Method, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", "u-42")
        .header("X-User-Role", "librarian")
        .body(body.into())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Body::empty()).await
}

/// 45 form-feed separated pages, "radar" three times on the last one.
fn radar_book() -> String {
    let mut pages = vec!["nothing to see here"; 44];
    pages.push("radar radar radar");
    pages.join("\u{c}")
}

async fn upload(app: &Router, title: &str, text: &str) -> u64 {
    let uri = format!("/documents?title={title}&author=Someone");
    let (status, json) = send(app, Method::POST, &uri, text.to_string()).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["book_id"].as_u64().unwrap()
}

#[tokio::test]
async fn upload_then_search_reports_pages_and_matches() {
    let (app, _dir) = app();
    let id = upload(&app, "B1", &radar_book()).await;

    let (status, json) = get(&app, "/search?q=radar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_results"], 1);
    let hit = &json["results"][0];
    assert_eq!(hit["book_id"].as_u64(), Some(id));
    assert_eq!(hit["title"], "B1");
    assert_eq!(hit["pages"], serde_json::json!([45]));
    assert_eq!(hit["total_matches"], 3);
    assert_eq!(hit["keywords_found"], serde_json::json!(["radar"]));
}

#[tokio::test]
async fn upload_reports_words_indexed() {
    let (app, _dir) = app();
    let (status, json) = send(&app, Method::POST, "/documents?title=Short", "radar missile radar".to_string()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["words_indexed"], 2);
}

#[tokio::test]
async fn upload_validation() {
    let (app, _dir) = app();
    let (status, _) = send(&app, Method::POST, "/documents?title=Empty", Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::POST, "/documents", "radar".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, json) = send(&app, Method::POST, "/documents?title=Bin", vec![0xffu8, 0xfe, 0x00]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("UTF-8"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let (app, _dir) = app();
    upload(&app, "B1", "radar").await;
    for uri in ["/search", "/search?q=", "/search?q=%20-%20!"] {
        let (status, json) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn limit_is_validated_and_applied() {
    let (app, _dir) = app();
    for i in 0..3 {
        upload(&app, &format!("Doc{i}"), "radar").await;
    }
    let (status, _) = get(&app, "/search?q=radar&limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/search?q=radar&limit=-3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get(&app, "/search?q=radar&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_results"], 3);
    assert_eq!(json["results"].as_array().unwrap().len(), 2);

    let (status, json) = get(&app, "/search?q=radar&limit=100000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["results"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn unmatched_query_is_empty_not_an_error() {
    let (app, _dir) = app();
    upload(&app, "B1", "radar").await;
    let (status, json) = get(&app, "/search?q=sonar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_results"], 0);
    assert_eq!(json["results"], serde_json::json!([]));
}

#[tokio::test]
async fn delete_removes_document_from_results() {
    let (app, dir) = app();
    let keep = upload(&app, "Keep", "radar").await;
    let gone = upload(&app, "Gone", "radar missile").await;
    assert!(dir.path().join("uploads").join(format!("{gone}.txt")).exists());

    let (status, json) = send(&app, Method::DELETE, &format!("/documents/{gone}"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Gone");
    assert!(!dir.path().join("uploads").join(format!("{gone}.txt")).exists());

    let (_, json) = get(&app, "/search?q=radar").await;
    assert_eq!(json["total_results"], 1);
    assert_eq!(json["results"][0]["book_id"].as_u64(), Some(keep));
    let (_, json) = get(&app, "/search?q=missile").await;
    assert_eq!(json["total_results"], 0);

    let (status, _) = get(&app, &format!("/documents/{gone}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::DELETE, &format!("/documents/{gone}"), Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_endpoints() {
    let (app, _dir) = app();
    let id = upload(&app, "Catalogued", "radar\u{c}missile").await;

    let (status, json) = get(&app, &format!("/documents/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "active");
    assert_eq!(json["total_pages"], 2);

    let (status, json) = get(&app, "/documents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);

    let (status, json) = get(&app, "/documents?status=failed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);

    let (status, _) = get(&app, "/documents?status=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, Method::POST, &format!("/documents/{id}/reindex"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["book_id"].as_u64(), Some(id));
    assert_eq!(json["words_indexed"], 2);

    let (status, json) = get(&app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["active"], 1);
    assert_eq!(json["words"], 2);
}

#[tokio::test]
async fn health() {
    let (app, _dir) = app();
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

/// Memory store whose postings lookups outlast the configured deadline.
struct SlowStore(MemoryStore);

impl IndexStore for SlowStore {
    fn upsert(&self, word: &str, doc_id: DocId, page: PageNumber, delta: u32, offset: u32) -> Result<(), StoreError> {
        self.0.upsert(word, doc_id, page, delta, offset)
    }
    fn postings_for(&self, word: &str) -> Result<Vec<Posting>, StoreError> {
        std::thread::sleep(Duration::from_millis(60));
        self.0.postings_for(word)
    }
    fn postings_for_document(&self, doc_id: DocId) -> Result<Vec<Posting>, StoreError> {
        self.0.postings_for_document(doc_id)
    }
    fn purge(&self, doc_id: DocId) -> Result<usize, StoreError> {
        self.0.purge(doc_id)
    }
    fn stats(&self) -> Result<IndexStats, StoreError> {
        self.0.stats()
    }
}

impl DocumentCatalog for SlowStore {
    fn next_document_id(&self) -> Result<DocId, StoreError> {
        self.0.next_document_id()
    }
    fn put_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.0.put_document(doc)
    }
    fn update_document(&self, doc: &Document) -> Result<bool, StoreError> {
        self.0.update_document(doc)
    }
    fn document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        self.0.document(id)
    }
    fn documents(&self) -> Result<Vec<Document>, StoreError> {
        self.0.documents()
    }
    fn remove_document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        self.0.remove_document(id)
    }
}

#[tokio::test]
async fn slow_search_answers_408() {
    let dir = tempdir().unwrap();
    let mut config = FolioConfig::default();
    config.search.timeout_ms = 5;
    let uploads = Arc::new(TextFileSource::new(dir.path(), config.indexing.page_chars));
    let engine = Engine::new(Arc::new(SlowStore(MemoryStore::new())), uploads.clone(), &config).unwrap();
    let app = build_app(AppState { engine: Arc::new(engine), uploads });

    upload(&app, "Slow", "radar missile").await;
    let (status, json) = get(&app, "/search?q=radar+missile").await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert!(json["error"].as_str().unwrap().contains("timed out"));
}
