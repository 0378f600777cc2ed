//! HTTP middleware stack for the operations server.
//!
//! Layers are listed outermost first: the first layer sees the request
//! first on the way in and the response last on the way out.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::shutdown::ShutdownController;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the transport-level middleware stack.
///
/// **Order (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID v4 `x-request-id` when the client sent none
/// 2. `Tracing` -- one span per request, tagged with method and URI
/// 3. `InFlight` -- counts the request until its response is produced
/// 4. `Compression` -- gzip when the client accepts it
/// 5. `CORS` -- origins from configuration, CRUD verbs only
/// 6. `Timeout` -- answers 408 once `request_timeout` elapses
/// 7. `PropagateRequestId` -- copies `x-request-id` onto the response
pub fn apply_http_layers(
    router: Router,
    config: &NetworkConfig,
    shutdown: Arc<ShutdownController>,
) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(from_fn_with_state(shutdown, track_in_flight))
            .layer(CompressionLayer::new())
            .layer(build_cors_layer(&config.cors_origins))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                config.request_timeout,
            ))
            .layer(PropagateRequestIdLayer::new(request_id)),
    )
}

/// Holds an in-flight guard for the lifetime of the request so shutdown can
/// wait for it.
async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}

/// CORS policy from the configured origins.
///
/// `"*"` anywhere in the list allows every origin; otherwise unparsable
/// entries are skipped and the rest form an allowlist.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    fn layered(config: &NetworkConfig, shutdown: Arc<ShutdownController>) -> Router {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    "late"
                }),
            );
        apply_http_layers(router, config, shutdown)
    }

    #[tokio::test]
    async fn assigns_and_propagates_request_id() {
        let app = layered(&NetworkConfig::default(), Arc::new(ShutdownController::new()));
        let response = app
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn keeps_client_request_id() {
        let app = layered(&NetworkConfig::default(), Arc::new(ShutdownController::new()));
        let response = app
            .oneshot(
                Request::get("/ok")
                    .header(REQUEST_ID_HEADER, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_times_out_with_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let app = layered(&config, Arc::new(ShutdownController::new()));
        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn in_flight_guard_released_after_response() {
        let shutdown = Arc::new(ShutdownController::new());
        let app = layered(&NetworkConfig::default(), Arc::clone(&shutdown));
        let _ = app
            .oneshot(Request::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(shutdown.in_flight_count(), 0);
    }

    #[test]
    fn build_cors_layer_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "not a header\n".to_string(),
        ];
        let _cors = build_cors_layer(&origins);
    }
}
