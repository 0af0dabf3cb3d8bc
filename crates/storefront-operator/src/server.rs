//! HTTP API for store provisioning
//!
//! ```text
//! GET    /stores         list stores
//! POST   /stores         create a store {name, type}
//! DELETE /stores/:name   delete a store
//! GET    /health         health probes (also /health/live, /health/ready)
//! ```
//!
//! The `/stores` routes sit behind the per-IP rate limiter.

use crate::controller::{CreateStoreRequest, ProvisioningController};
use crate::error::OperatorError;
use crate::rate_limiter::{throttle, RateLimitConfig, RateLimiter};
use crate::store::Store;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub rate_limit: RateLimitConfig,
}

/// Shared server state
pub struct ServerState {
    pub controller: Arc<ProvisioningController>,
}

/// Store API server
pub struct StoreServer {
    state: Arc<ServerState>,
    limiter: Arc<RateLimiter>,
}

impl StoreServer {
    pub fn new(controller: Arc<ProvisioningController>, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(ServerState { controller }),
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let stores = Router::new()
            .route("/stores", get(list_stores).post(create_store))
            .route("/stores/:name", delete(delete_store))
            .layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                throttle,
            ))
            .with_state(self.state.clone());

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(self.state.clone())
            .merge(stores)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the process exits
    pub async fn run(self, addr: SocketAddr) -> anyhow::Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves
    pub async fn run_until<F>(self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Store API listening on {}", addr);

        let limiter = self.limiter.clone();
        let cleanup = tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.config().window);
            loop {
                interval.tick().await;
                limiter.cleanup_stale();
            }
        });

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        cleanup.abort();
        served?;
        Ok(())
    }
}

// ============================================================================
// Helper for converting OperatorError to HTTP response
// ============================================================================

fn error_response(e: OperatorError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e.http_status() {
        400 => StatusCode::BAD_REQUEST,
        403 => StatusCode::FORBIDDEN,
        409 => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = match e {
        OperatorError::Installation { details, .. } => ErrorResponse {
            error: "Provisioning failed".to_string(),
            details: Some(details),
        },
        other => ErrorResponse {
            error: other.to_string(),
            details: other.details().map(str::to_string),
        },
    };
    (status, Json(body))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ReadinessResponse {
    status: &'static str,
    stores: usize,
    max_stores: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Kubernetes liveness probe - is the service alive?
async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe - can the service handle requests?
async fn readiness_handler(State(state): State<Arc<ServerState>>) -> Json<ReadinessResponse> {
    let registry = state.controller.registry();
    Json(ReadinessResponse {
        status: "ready",
        stores: registry.len(),
        max_stores: registry.max_stores(),
    })
}

async fn list_stores(State(state): State<Arc<ServerState>>) -> Json<Vec<Store>> {
    Json(state.controller.list_stores())
}

async fn create_store(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Store>), (StatusCode, Json<ErrorResponse>)> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Malformed create request");
        error_response(OperatorError::Validation(
            "name and type are required".to_string(),
        ))
    })?;

    state
        .controller
        .create_store(request)
        .await
        .map(|store| (StatusCode::CREATED, Json(store)))
        .map_err(error_response)
}

async fn delete_store(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Json<MessageResponse> {
    state.controller.delete_store(&name).await;
    Json(MessageResponse {
        message: "Store deleted".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::testing::{FakeCluster, FakeExecutor};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use std::time::Duration;
    use tower::util::ServiceExt;

    struct TestApp {
        router: Router,
        controller: Arc<ProvisioningController>,
        executor: Arc<FakeExecutor>,
    }

    fn create_test_app(config: ServerConfig) -> TestApp {
        let cluster = Arc::new(FakeCluster::new());
        let executor = Arc::new(FakeExecutor::new());
        let controller = Arc::new(ProvisioningController::new(
            &OperatorConfig::default(),
            cluster.clone(),
            cluster,
            executor.clone(),
        ));
        let server = StoreServer::new(controller.clone(), config);
        TestApp {
            router: server.router(),
            controller,
            executor,
        }
    }

    fn post_store(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/stores")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = create_test_app(ServerConfig::default());
        for uri in ["/health", "/health/live", "/health/ready"] {
            let response = app.router.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_list_stores_empty() {
        let app = create_test_app(ServerConfig::default());
        let response = app.router.oneshot(get("/stores")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_store() {
        let app = create_test_app(ServerConfig::default());
        let response = app
            .router
            .clone()
            .oneshot(post_store(r#"{"name":"MyStore ","type":"woocommerce"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["name"], "mystore");
        assert_eq!(body["type"], "woocommerce");
        assert_eq!(body["status"], "Provisioning");
        assert_eq!(body["namespace"], "store-mystore");
        assert_eq!(body["url"], "http://store-mystore.localhost");
        assert!(body["createdAt"].is_string());

        let response = app.router.oneshot(get("/stores")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_store_validation() {
        let app = create_test_app(ServerConfig::default());
        for body in [r#"{"name":"shop"}"#, r#"{"type":"woocommerce"}"#, "{}", "not json"] {
            let response = app.router.clone().oneshot(post_store(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
            assert!(json_body(response).await["error"].is_string());
        }
        assert!(app.executor.installs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_returns_forbidden() {
        let app = create_test_app(ServerConfig::default());
        for i in 0..5 {
            let body = format!(r#"{{"name":"s{i}","type":"woocommerce"}}"#);
            let response = app.router.clone().oneshot(post_store(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .router
            .oneshot(post_store(r#"{"name":"s5","type":"woocommerce"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(app.controller.list_stores().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_returns_conflict() {
        let app = create_test_app(ServerConfig::default());
        let body = r#"{"name":"shop","type":"woocommerce"}"#;
        app.router.clone().oneshot(post_store(body)).await.unwrap();

        let response = app.router.oneshot(post_store(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_install_failure_returns_details() {
        let app = create_test_app(ServerConfig::default());
        app.executor.fail_installs("Error: INSTALLATION FAILED: timed out");

        let response = app
            .router
            .oneshot(post_store(r#"{"name":"shop","type":"woocommerce"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Provisioning failed");
        assert_eq!(body["details"], "Error: INSTALLATION FAILED: timed out");
        assert!(app.controller.list_stores().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_store() {
        let app = create_test_app(ServerConfig::default());
        app.executor.fail_uninstalls();
        app.router
            .clone()
            .oneshot(post_store(r#"{"name":"shop","type":"woocommerce"}"#))
            .await
            .unwrap();

        let request = Request::builder()
            .method("DELETE")
            .uri("/stores/Shop")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Store deleted");
        assert!(app.controller.list_stores().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_store_still_ok() {
        let app = create_test_app(ServerConfig::default());
        let request = Request::builder()
            .method("DELETE")
            .uri("/stores/ghost")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_applies_to_stores_only() {
        let app = create_test_app(ServerConfig {
            rate_limit: RateLimitConfig {
                max_requests: 2,
                window: Duration::from_secs(60),
            },
        });

        for _ in 0..2 {
            let response = app.router.clone().oneshot(get("/stores")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.router.clone().oneshot(get("/stores")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            json_body(response).await["error"],
            "Too many requests. Try again later."
        );

        let response = app.router.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::advance(Duration::from_secs(60)).await;
        let response = app.router.oneshot(get("/stores")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
