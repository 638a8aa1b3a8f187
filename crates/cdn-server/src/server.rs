//! HTTP server for content endpoints
//!
//! Provides /health, /content/list, /content/{hash} and, when enabled,
//! upload and delete.

use crate::config::Config;
use crate::handlers;
use crate::keys;
use crate::limiter::{self, LeakyBucket};
use crate::sink::RequestErrorSink;
use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use cdn_db::StoreController;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{field, info_span, Instrument};
use uuid::Uuid;

/// Upload body limit
pub const MAX_UPLOAD_BYTES: usize = 150 * 1024 * 1024;

/// Shared state for the HTTP server
pub struct ServerState {
    pub durable: StoreController,
    pub cache: Option<StoreController>,
    pub service_id: String,
    /// Source of keys for uploaded content
    pub new_key: fn() -> String,
}

impl ServerState {
    pub fn new(
        durable: StoreController,
        cache: Option<StoreController>,
        service_id: impl Into<String>,
    ) -> Self {
        Self {
            durable,
            cache,
            service_id: service_id.into(),
            new_key: keys::content_key,
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Which optional routes and layers to install
#[derive(Debug, Clone, Default)]
pub struct RouterOptions {
    pub allow_insert: bool,
    pub allow_delete: bool,
    /// `(rate, slack)` when admission control is on
    pub rate_limit: Option<(u32, u32)>,
}

impl RouterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_insert: config.http.allow_insert,
            allow_delete: config.http.allow_delete,
            rate_limit: config
                .rate_limit
                .enabled
                .then_some((config.rate_limit.rate, config.rate_limit.slack)),
        }
    }
}

/// Create the HTTP router
pub fn create_router(state: SharedState, options: &RouterOptions) -> Router {
    let mut content = get(handlers::get_file);
    if options.allow_delete {
        content = content.delete(handlers::delete_file);
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/content/list", get(handlers::get_file_list))
        .route("/content/{hash}", content);
    if options.allow_insert {
        router = router.route("/content/", post(handlers::post_file));
    }

    let mut router = router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), request_context))
        .layer(TraceLayer::new_for_http());

    // Outermost, so queued requests hold no other resources
    if let Some((rate, slack)) = options.rate_limit {
        let bucket = Arc::new(LeakyBucket::new(rate, slack));
        router = router.layer(middleware::from_fn_with_state(bucket, limiter::admission));
    }

    router.with_state(state)
}

/// Opens the request span and hands handlers an error sink bound to it
async fn request_context(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    let span = info_span!(
        "request",
        request.id = %Uuid::new_v4(),
        request.path = %request.uri().path(),
        service.id = %state.service_id,
        error.count = 0u64,
        otel.status_code = field::Empty,
    );

    let (sink, aggregator) = RequestErrorSink::new(span.clone());
    tokio::spawn(aggregator.drain());
    request.extensions_mut().insert(sink);

    next.run(request).instrument(span).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use cdn_db::{MemoryCacheRepository, MemoryRepository, StoredFile};
    use tower::ServiceExt;

    pub(crate) async fn seeded_state(files: Vec<StoredFile>, with_cache: bool) -> SharedState {
        let durable = StoreController::durable(Arc::new(MemoryRepository::with_files(files).await));
        let cache = with_cache
            .then(|| StoreController::cache(Arc::new(MemoryCacheRepository::new())));
        Arc::new(ServerState::new(durable, cache, "test"))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = seeded_state(vec![], true).await;
        let router = create_router(state, &RouterOptions::default());

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_write_routes_are_off_by_default() {
        let state = seeded_state(vec![StoredFile::new("0001", "test", vec![1])], false).await;
        let router = create_router(state.clone(), &RouterOptions::default());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/content/0001")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(state.durable.get_file("0001").await.is_ok());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/content/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_paces_requests() {
        let state = seeded_state(vec![], false).await;
        let options = RouterOptions {
            rate_limit: Some((5, 0)),
            ..RouterOptions::default()
        };
        let router = create_router(state, &options);
        let start = tokio::time::Instant::now();

        for _ in 0..10 {
            let response = router
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert!(start.elapsed() >= std::time::Duration::from_secs(2));
    }
}
