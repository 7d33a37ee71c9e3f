//! Read-only HTTP surface over the live inbox.
//!
//! `dig serve` runs this server and, in the background, the scan passes on
//! a fixed interval, so the process is both the pipeline's scheduler and its
//! observer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Health check (returns version) |
//! | `GET` | `/inbox/count` | Active item count |
//! | `GET` | `/inbox/items?limit=N` | Newest active items |
//! | `GET` | `/inbox/items/{id}` | One active item |
//! | `GET` | `/inbox/items/{id}/candidates?limit=N` | Top candidates by confidence |
//! | `GET` | `/inbox/events` | Server-sent `count` events on every change |
//! | `GET` | `/inbox/items/{id}/events` | Server-sent `item` events for one item |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no active inbox item: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use digbin_core::eligibility::is_needs_review;
use digbin_core::models::{InboxItem, ProviderSnapshot};
use digbin_core::pipeline::Pipeline;
use digbin_core::store::InboxStore;

use crate::config::Config;
use crate::feed::LiveInbox;
use crate::providers::{build_extractor, build_provider};
use crate::scan::Scanner;
use crate::sqlite_store::SqliteStore;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;
const DEFAULT_CANDIDATE_LIMIT: i64 = 5;

/// Shared state for every route handler.
pub struct AppState<S: InboxStore> {
    pub store: Arc<S>,
    pub live: Arc<LiveInbox<S>>,
}

impl<S: InboxStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            live: self.live.clone(),
        }
    }
}

/// Starts the server and the background scan loop.
///
/// Binds to `[server].bind`. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let live = Arc::new(LiveInbox::new(store.clone()));
    let pipeline = Arc::new(
        Pipeline::new(store.clone())
            .with_policy(config.pipeline.policy())
            .with_listener(live.listener()),
    );

    let interval_secs = config.server.scan_interval_secs;
    if interval_secs > 0 {
        let scanner = Scanner::new(pipeline, config.pipeline.batch_limit)
            .with_extractor(build_extractor(&config.ocr))
            .with_provider(build_provider(&config.lookup)?);
        let live = live.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                if let Err(e) = scanner.run_once().await {
                    error!(error = %e, "scan pass failed");
                }
                // Pick up writes from other processes (e.g. `dig add`).
                live.poke();
            }
        });
        info!(every_secs = interval_secs, "background scanning enabled");
    }

    let app = router(AppState { store, live });

    println!("digbin server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router<S: InboxStore + 'static>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/inbox/count", get(handle_count::<S>))
        .route("/inbox/items", get(handle_list::<S>))
        .route("/inbox/items/{id}", get(handle_item::<S>))
        .route("/inbox/items/{id}/candidates", get(handle_candidates::<S>))
        .route("/inbox/events", get(handle_count_events::<S>))
        .route("/inbox/items/{id}/events", get(handle_item_events::<S>))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "request failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

fn resolve_limit(requested: Option<i64>, default: i64) -> Result<i64, AppError> {
    match requested {
        None => Ok(default),
        Some(n) if (1..=MAX_LIST_LIMIT).contains(&n) => Ok(n),
        Some(n) => Err(bad_request(format!(
            "limit must be in [1, {}], got {}",
            MAX_LIST_LIMIT, n
        ))),
    }
}

async fn active_item<S: InboxStore>(store: &S, id: &str) -> Result<InboxItem, AppError> {
    store
        .get_item(id)
        .await?
        .filter(|i| !i.is_deleted())
        .ok_or_else(|| not_found(format!("no active inbox item: {}", id)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Inbox reads ============

#[derive(Serialize)]
struct CountResponse {
    count: i64,
}

async fn handle_count<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.store.count_active().await?;
    Ok(Json(CountResponse { count }))
}

#[derive(Serialize)]
struct ListResponse {
    items: Vec<InboxItem>,
}

async fn handle_list<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
    Query(params): Query<LimitParams>,
) -> Result<Json<ListResponse>, AppError> {
    let limit = resolve_limit(params.limit, DEFAULT_LIST_LIMIT)?;
    let items = state.store.list_active(limit).await?;
    Ok(Json(ListResponse { items }))
}

#[derive(Serialize)]
struct ItemResponse {
    item: InboxItem,
    needs_review: bool,
}

async fn handle_item<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Json<ItemResponse>, AppError> {
    let item = active_item(state.store.as_ref(), &id).await?;
    Ok(Json(ItemResponse {
        needs_review: is_needs_review(&item),
        item,
    }))
}

#[derive(Serialize)]
struct CandidatesResponse {
    candidates: Vec<ProviderSnapshot>,
}

async fn handle_candidates<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    Query(params): Query<LimitParams>,
) -> Result<Json<CandidatesResponse>, AppError> {
    let limit = resolve_limit(params.limit, DEFAULT_CANDIDATE_LIMIT)?;
    active_item(state.store.as_ref(), &id).await?;
    let candidates = state.store.top_snapshots(&id, limit).await?;
    Ok(Json(CandidatesResponse { candidates }))
}

// ============ Server-sent events ============

/// Emit the current value, then one event per published change.
fn watch_events<T>(
    rx: watch::Receiver<T>,
    name: &'static str,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Send + Sync + 'static,
{
    stream::unfold((rx, true), move |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let data = serde_json::to_string(&*rx.borrow_and_update())
            .unwrap_or_else(|_| "null".to_string());
        Some((Ok(Event::default().event(name).data(data)), (rx, false)))
    })
}

async fn handle_count_events<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let rx = state.live.active_count().await?;
    Ok(Sse::new(watch_events(rx, "count")).keep_alive(KeepAlive::default()))
}

async fn handle_item_events<S: InboxStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    active_item(state.store.as_ref(), &id).await?;
    let rx = state.live.item(&id).await?;
    Ok(Sse::new(watch_events(rx, "item")).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use digbin_core::models::{ErrorCode, ProviderCandidate};
    use digbin_core::store::memory::InMemoryStore;

    struct Harness {
        base: String,
        pipeline: Pipeline<InMemoryStore>,
    }

    async fn start() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let live = Arc::new(LiveInbox::new(store.clone()));
        let pipeline = Pipeline::new(store.clone()).with_listener(live.listener());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState { store, live });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Harness {
            base: format!("http://{}", addr),
            pipeline,
        }
    }

    async fn get_json(url: &str) -> (u16, serde_json::Value) {
        let resp = reqwest::get(url).await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health_and_count() {
        let h = start().await;
        let (status, body) = get_json(&format!("{}/health", h.base)).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");

        h.pipeline.create_barcode("X1").await.unwrap();
        h.pipeline.create_quick_add("Kind of Blue", "Miles Davis").await.unwrap();
        let (_, body) = get_json(&format!("{}/inbox/count", h.base)).await;
        assert_eq!(body["count"], 2);

        let (_, body) = get_json(&format!("{}/inbox/items?limit=1", h.base)).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["items"][0]["source_type"], "QUICK_ADD");
    }

    #[tokio::test]
    async fn test_item_and_candidates() {
        let h = start().await;
        let item = h.pipeline.create_barcode("X123").await.unwrap();
        let found = vec![
            ProviderCandidate {
                provider: "t".into(),
                provider_item_id: "miss".into(),
                ..Default::default()
            },
            ProviderCandidate {
                provider: "t".into(),
                provider_item_id: "hit".into(),
                barcode: Some("X123".into()),
                ..Default::default()
            },
        ];
        h.pipeline
            .apply_lookup_results(&item.id, &found, ErrorCode::None)
            .await
            .unwrap();

        let (status, body) = get_json(&format!("{}/inbox/items/{}", h.base, item.id)).await;
        assert_eq!(status, 200);
        assert_eq!(body["item"]["lookup_status"], "NEEDS_REVIEW");
        assert_eq!(body["needs_review"], true);

        let url = format!("{}/inbox/items/{}/candidates?limit=1", h.base, item.id);
        let (_, body) = get_json(&url).await;
        let candidates = body["candidates"].as_array().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0]["provider_item_id"], "hit");
    }

    #[tokio::test]
    async fn test_errors_use_envelope() {
        let h = start().await;
        let (status, body) = get_json(&format!("{}/inbox/items/nope", h.base)).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, body) = get_json(&format!("{}/inbox/items?limit=0", h.base)).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"]["code"], "bad_request");

        let item = h.pipeline.create_barcode("gone").await.unwrap();
        h.pipeline.soft_delete(&item.id).await.unwrap();
        let (status, _) = get_json(&format!("{}/inbox/items/{}", h.base, item.id)).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_count_events_stream() {
        let h = start().await;
        let mut resp = reqwest::get(format!("{}/inbox/events", h.base)).await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let first = String::from_utf8(resp.chunk().await.unwrap().unwrap().to_vec()).unwrap();
        assert!(first.contains("event: count"));
        assert!(first.contains("data: 0"));

        h.pipeline.create_barcode("X1").await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), resp.chunk())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(next.to_vec()).unwrap().contains("data: 1"));
    }
}
