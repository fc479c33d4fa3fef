use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use folio_core::builder::IndexSummary;
use folio_core::persist::{load_config, open_sled, upload_ref, DataPaths};
use folio_core::source::TextFileSource;
use folio_core::store::{MemoryStore, SharedStore};
use folio_core::{DocId, Document, DocumentDraft, DocumentStatus, Engine, FolioConfig, FolioError, LibraryStats, SearchResults};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub uploads: Arc<TextFileSource>,
}

pub struct ServerOptions {
    pub data_dir: PathBuf,
    pub config: Option<PathBuf>,
    /// Keep the index in memory instead of `<data_dir>/index`.
    pub in_memory: bool,
}

pub fn open_state(options: &ServerOptions) -> Result<AppState> {
    let paths = DataPaths::new(&options.data_dir);
    let config: FolioConfig = load_config(&paths, options.config.as_deref()).context("loading config")?;
    paths.ensure().context("preparing data dir")?;
    let store: SharedStore = if options.in_memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(open_sled(&paths).with_context(|| format!("opening index at {}", paths.index().display()))?)
    };
    let uploads = Arc::new(TextFileSource::new(paths.uploads(), config.indexing.page_chars));
    let engine = Engine::new(store, uploads.clone(), &config).context("building engine")?;
    Ok(AppState { engine: Arc::new(engine), uploads })
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/documents", post(upload_handler).get(list_handler))
        .route("/documents/:id", get(doc_handler).delete(delete_handler))
        .route("/documents/:id/reindex", post(reindex_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Purge postings of vanished documents every `period`.
pub fn spawn_orphan_sweeper(engine: Arc<Engine>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let engine = engine.clone();
            match tokio::task::spawn_blocking(move || engine.sweep_orphans()).await {
                Ok(report) if report.documents > 0 || report.deferred > 0 => {
                    tracing::info!(documents = report.documents, postings = report.postings, deferred = report.deferred, "orphan sweep");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "orphan sweep task panicked"),
            }
        }
    })
}

/// Caller identity as forwarded by the upstream auth layer. Only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub user: Option<String>,
    pub role: Option<String>,
}

impl Principal {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self { user: read("X-User-Id"), role: read("X-User-Role") }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Engine(FolioError),
    BadRequest(String),
    Internal(String),
}

impl From<FolioError> for ApiError {
    fn from(e: FolioError) -> Self {
        ApiError::Engine(e)
    }
}

#[derive(Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Engine(err) => {
                let status = match &err {
                    FolioError::Validation(_) => StatusCode::BAD_REQUEST,
                    FolioError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    FolioError::NotFound(_) => StatusCode::NOT_FOUND,
                    FolioError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
                    FolioError::Store(_) | FolioError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (status, err.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> folio_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker failed: {e}")))?
        .map_err(ApiError::from)
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

pub async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    let principal = Principal::from_headers(&headers);
    let limit = match params.limit {
        None => None,
        Some(n) if n < 1 => return Err(FolioError::Validation("limit must be at least 1".into()).into()),
        Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
    };
    let timeout = state.engine.search_timeout();
    let engine = state.engine.clone();
    let query = params.q.clone();
    let search = blocking(move || engine.search(&query, limit));
    let results = match tokio::time::timeout(timeout, search).await {
        Ok(results) => results?,
        Err(_) => return Err(FolioError::Timeout(timeout).into()),
    };
    tracing::info!(user = ?principal.user, role = ?principal.role, q = %params.q, total_results = results.total_results, "search");
    Ok(Json(results))
}

#[derive(Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub isbn: String,
}

#[derive(Serialize, Deserialize)]
pub struct UploadResponse {
    pub book_id: DocId,
    pub words_indexed: usize,
}

impl From<IndexSummary> for UploadResponse {
    fn from(s: IndexSummary) -> Self {
        Self { book_id: s.document_id, words_indexed: s.words_indexed }
    }
}

pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let principal = Principal::from_headers(&headers);
    if params.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if body.is_empty() {
        return Err(ApiError::BadRequest("document body is empty".into()));
    }
    if std::str::from_utf8(&body).is_err() {
        return Err(ApiError::BadRequest("document body must be UTF-8 text".into()));
    }

    let draft = DocumentDraft { title: params.title, author: params.author, subject: params.subject, isbn: params.isbn };
    let engine = state.engine.clone();
    let uploads = state.uploads.clone();
    let summary = blocking(move || {
        let id = engine.allocate_id()?;
        let storage_ref = upload_ref(id);
        uploads
            .save(&storage_ref, &body)
            .map_err(|e| folio_core::StoreError::Unavailable(format!("saving upload: {e}")))?;
        let outcome = engine.ingest(id, draft, storage_ref.clone());
        if matches!(outcome, Err(FolioError::Validation(_))) {
            let _ = uploads.delete(&storage_ref);
        }
        outcome
    })
    .await?;
    tracing::info!(user = ?principal.user, book_id = summary.document_id, words_indexed = summary.words_indexed, "document uploaded");
    Ok((StatusCode::CREATED, Json(summary.into())))
}

pub async fn reindex_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> Result<Json<UploadResponse>, ApiError> {
    let engine = state.engine.clone();
    let summary = blocking(move || engine.reindex(id)).await?;
    Ok(Json(summary.into()))
}

pub async fn delete_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<DocId>,
) -> Result<Json<Document>, ApiError> {
    let principal = Principal::from_headers(&headers);
    let engine = state.engine.clone();
    let doc = blocking(move || engine.remove(id)).await?;
    if let Err(e) = state.uploads.delete(&doc.storage_ref) {
        tracing::warn!(book_id = id, error = %e, "could not delete uploaded file");
    }
    tracing::info!(user = ?principal.user, role = ?principal.role, book_id = id, "document deleted");
    Ok(Json(doc))
}

pub async fn doc_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    let engine = state.engine.clone();
    Ok(Json(blocking(move || engine.document(id)).await?))
}

#[derive(Deserialize)]
pub struct ListParams {
    /// `active` (default), `indexing`, `failed` or `all`.
    pub status: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct DocumentList {
    pub total: usize,
    pub documents: Vec<Document>,
}

pub async fn list_handler(State(state): State<AppState>, Query(params): Query<ListParams>) -> Result<Json<DocumentList>, ApiError> {
    let status = match params.status.as_deref() {
        None => Some(DocumentStatus::Active),
        Some("all") => None,
        Some(s) => Some(s.parse::<DocumentStatus>().map_err(ApiError::BadRequest)?),
    };
    let engine = state.engine.clone();
    let documents = blocking(move || engine.documents(status)).await?;
    Ok(Json(DocumentList { total: documents.len(), documents }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<LibraryStats>, ApiError> {
    let engine = state.engine.clone();
    Ok(Json(blocking(move || engine.stats()).await?))
}
