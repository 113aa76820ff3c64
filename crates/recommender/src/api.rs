//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use recommender_lib::health::{ComponentStatus, HealthRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self { health_registry }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still recommending
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once a cycle completed
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    render_metrics(&prometheus::gather())
}

type MetricsResponse = (StatusCode, [(&'static str, &'static str); 1], Vec<u8>);

fn render_metrics(metric_families: &[MetricFamily]) -> MetricsResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    serve_on(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` fires
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "Starting API server");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use recommender_lib::provider::StaticProvider;
    use recommender_lib::{
        ClusterStateFeeder, FeederConfig, MemoryStore, Recommender, RecommenderMetrics, Store,
    };
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    async fn test_state() -> Arc<AppState> {
        let health_registry = HealthRegistry::new();
        health_registry.register_all().await;
        Arc::new(AppState::new(health_registry))
    }

    /// Run one real cycle over `applications`; the ones listed in `failing`
    /// get a backend error instead of metrics.
    async fn run_cycle(state: &AppState, applications: &[&str], failing: &[&str]) {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(StaticProvider::new());
        for name in applications {
            store.create_application(name).await.unwrap();
        }
        for name in failing {
            provider.set_failure(name, "connection refused");
        }
        let feeder = ClusterStateFeeder::new(store, provider, FeederConfig::default());
        let mut recommender = Recommender::new(feeder, state.health_registry.clone());
        recommender.run_once().await;
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, body) = get(state, uri).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_lists_components_before_first_cycle() {
        let state = test_state().await;

        let (status, health) = get_json(state, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["feeder"].is_object());
        assert!(health["components"]["store"].is_object());
        assert!(health["components"]["metrics_backend"].is_object());
        assert!(health.get("last_cycle").is_none());
    }

    #[tokio::test]
    async fn test_healthz_ok_when_degraded() {
        let state = test_state().await;
        run_cycle(&state, &["svc-a", "svc-b"], &["svc-b"]).await;

        let (status, health) = get_json(state, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(
            health["components"]["metrics_backend"]["message"],
            "1 of 2 metrics fetches failed"
        );
        assert_eq!(health["last_cycle"]["fetch_failed"], 1);
    }

    #[tokio::test]
    async fn test_healthz_503_when_backend_down() {
        let state = test_state().await;
        run_cycle(&state, &["svc-a"], &["svc-a"]).await;

        let (status, health) = get_json(state, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_503_before_first_cycle() {
        let state = test_state().await;

        let (status, readiness) = get_json(state, "/readyz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);
        assert_eq!(readiness["reason"], "No recommendation cycle completed yet");
    }

    #[tokio::test]
    async fn test_readyz_ok_after_a_cycle() {
        let state = test_state().await;
        run_cycle(&state, &["svc-a"], &[]).await;

        let (status, readiness) = get_json(state, "/readyz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
        assert!(readiness["last_cycle_age_secs"].is_number());
    }

    #[tokio::test]
    async fn test_readyz_503_after_cycle_with_backend_down() {
        let state = test_state().await;
        run_cycle(&state, &["svc-a"], &["svc-a"]).await;

        let (status, readiness) = get_json(state, "/readyz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            readiness["reason"],
            "metrics_backend unhealthy: all 1 metrics fetches failed"
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let state = test_state().await;
        let metrics = RecommenderMetrics::new();
        metrics.observe_cycle_duration(0.2);
        metrics.observe_fetch_duration(0.05);
        metrics.set_state_sizes(3, 1, 3, 3);
        metrics.add_persisted_rows(6);

        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("recommender_cycle_duration_seconds_bucket"));
        assert!(text.contains("recommender_fetch_duration_seconds_count"));
        assert!(text.contains("recommender_applications"));
        assert!(text.contains("recommender_targets{axis=\"timeframe\"}"));
        assert!(text.contains("recommender_persisted_rows_total"));
    }

    #[test]
    fn test_unencodable_metrics_give_500() {
        // a family without samples is rejected by the text encoder
        let mut family = MetricFamily::default();
        family.set_name("recommender_empty".to_string());

        let (status, _, body) = render_metrics(&[family]);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (status, _) = get(test_state().await, "/recommendations").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let server = tokio::spawn(serve_on(listener, test_state().await, shutdown_tx.subscribe()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /healthz HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);

        shutdown_tx.send(()).unwrap();
        let stopped = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop after shutdown");
        stopped.unwrap().unwrap();
    }
}
