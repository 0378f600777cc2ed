//! Network module with deferred startup lifecycle.
//!
//! `new()` builds the service pipeline, `start()` binds the TCP listener and
//! `serve()` accepts connections until the shutdown future resolves.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    create_operation, delete_operation, get_operation, health_handler, list_operations,
    liveness_handler, readiness_handler, update_operation, AppState,
};
use super::middleware::apply_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{build_operation_pipeline, OperationPipeline, OperationService};
use crate::storage::OperationStore;

/// Owns the listener, the pipeline and the shutdown controller of one server.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    store: Arc<dyn OperationStore>,
    pipeline: OperationPipeline,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module around an already initialized store. No port is bound yet.
    #[must_use]
    pub fn new(config: NetworkConfig, store: Arc<dyn OperationStore>) -> Self {
        let pipeline = build_operation_pipeline(OperationService::new(Arc::clone(&store)));
        Self {
            config,
            listener: None,
            store,
            pipeline,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET|POST /operations` (also with a trailing slash)
    /// - `GET|PUT|DELETE /operations/{id}`
    /// - `GET /health`, `GET /health/live`, `GET /health/ready`
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pipeline: self.pipeline.clone(),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        let router = Router::new()
            .route("/operations", get(list_operations).post(create_operation))
            .route("/operations/", get(list_operations).post(create_operation))
            .route(
                "/operations/{id}",
                get(get_operation)
                    .put(update_operation)
                    .delete(delete_operation),
            )
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .with_state(state);

        apply_http_layers(router, &self.config, Arc::clone(&self.shutdown))
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, tls = self.config.is_tls(), "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then drains and closes the store.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to `Draining`
    /// 2. Waits up to `drain_timeout` for in-flight requests
    /// 3. Health state transitions to `Stopped` and the store is closed
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, if TLS material
    /// cannot be loaded, or on a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();

        self.shutdown.set_ready();

        let served = match &self.config.tls {
            Some(tls) => serve_tls(listener, router, tls, shutdown).await,
            None => serve_plain(listener, router, shutdown).await,
        };

        self.shutdown.begin_drain();
        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timeout expired with requests still in flight"
            );
        }
        self.store.close().await;

        served
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls, reusing the
/// pre-bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let forward = forward_shutdown(shutdown, handle.clone());

    info!(%addr, "serving HTTPS");

    let served = axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await;
    // The server can stop on an I/O error before the signal arrives.
    forward.abort();
    served?;
    Ok(())
}

/// Starts graceful shutdown of `handle` once `shutdown` resolves.
fn forward_shutdown(
    shutdown: impl Future<Output = ()> + Send + 'static,
    handle: axum_server::Handle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown.await;
        handle.graceful_shutdown(None);
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use proptest::prelude::*;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::storage::testing::FailingStore;
    use crate::storage::MemoryOperationStore;

    fn module_with(store: Arc<dyn OperationStore>) -> NetworkModule {
        NetworkModule::new(NetworkConfig::default(), store)
    }

    fn app() -> Router {
        module_with(Arc::new(MemoryOperationStore::new())).build_router()
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost:8000");
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, name: &str, description: &str) -> Response {
        send(
            app,
            "POST",
            "/operations/",
            Some(json!({"name": name, "description": description})),
        )
        .await
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module_with(Arc::new(MemoryOperationStore::new()));
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = module_with(Arc::new(MemoryOperationStore::new()));
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule::new(
            NetworkConfig {
                host: "127.0.0.1".to_string(),
                ..NetworkConfig::default()
            },
            Arc::new(MemoryOperationStore::new()),
        );
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = module_with(Arc::new(MemoryOperationStore::new()));
        let err = module.serve(std::future::ready(())).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serve_stops_when_shutdown_resolves() {
        let mut module = NetworkModule::new(
            NetworkConfig {
                host: "127.0.0.1".to_string(),
                ..NetworkConfig::default()
            },
            Arc::new(MemoryOperationStore::new()),
        );
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        tokio::time::timeout(Duration::from_secs(5), module.serve(std::future::ready(())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.health_state(), crate::network::HealthState::Stopped);
    }

    #[tokio::test]
    async fn full_lifecycle_scenario() {
        let app = app();

        let response = create(&app, "scan", "network scan").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = send(&app, "GET", &format!("/operations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["name"], "scan");
        assert_eq!(body["data"]["description"], "network scan");

        let response = create(&app, "scan", "other").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            json_body(response).await,
            json!({"detail": "An operation with this name already exists"})
        );

        let response = send(
            &app,
            "PUT",
            &format!("/operations/{id}"),
            Some(json!({"description": "deep scan"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(send(&app, "GET", &format!("/operations/{id}"), None).await).await;
        assert_eq!(body["data"]["name"], "scan");
        assert_eq!(body["data"]["description"], "deep scan");

        let response = send(&app, "DELETE", &format!("/operations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", &format!("/operations/{id}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({"detail": "Operation does not exist"})
        );
    }

    #[tokio::test]
    async fn empty_table_lists_as_no_content() {
        let app = app();
        for uri in ["/operations", "/operations/"] {
            let response = send(&app, "GET", uri, None).await;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert!(bytes.is_empty());
        }
    }

    #[tokio::test]
    async fn listing_returns_created_rows() {
        let app = app();
        create(&app, "scan", "a").await;
        create(&app, "sweep", "b").await;

        let response = send(&app, "GET", "/operations", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], 200);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_sets_updated_at_after_created_at() {
        let app = app();
        let id = json_body(create(&app, "scan", "a").await).await["id"]
            .as_i64()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let response = send(
            &app,
            "PUT",
            &format!("/operations/{id}"),
            Some(json!({"description": "b"})),
        )
        .await;
        let data = json_body(response).await["data"].clone();

        let created = data["created_at"].as_str().unwrap().to_string();
        let updated = data["updated_at"].as_str().unwrap().to_string();
        let created: chrono::NaiveDateTime = created.parse().unwrap();
        let updated: chrono::NaiveDateTime = updated.parse().unwrap();
        assert!(updated > created);
        assert_eq!(data["name"], "scan");
    }

    #[tokio::test]
    async fn rename_onto_taken_name_is_conflict() {
        let app = app();
        create(&app, "scan", "a").await;
        let id = json_body(create(&app, "sweep", "b").await).await["id"]
            .as_i64()
            .unwrap();

        let response = send(
            &app,
            "PUT",
            &format!("/operations/{id}"),
            Some(json!({"name": "scan"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn missing_ids_are_404() {
        let app = app();
        for (method, body) in [
            ("GET", None),
            ("PUT", Some(json!({"description": "x"}))),
            ("DELETE", None),
        ] {
            let response = send(&app, method, "/operations/999", body).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
        }
    }

    #[tokio::test]
    async fn ids_beyond_the_column_range_are_404() {
        let app = app();
        for (method, body) in [
            ("GET", None),
            ("PUT", Some(json!({"description": "x"}))),
            ("DELETE", None),
        ] {
            let response = send(&app, method, "/operations/3000000000", body).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method}");
            assert_eq!(
                json_body(response).await,
                json!({"detail": "Operation does not exist"}),
                "{method}"
            );
        }
    }

    #[tokio::test]
    async fn update_reports_path_and_body_errors_together() {
        let app = app();
        let response = send(&app, "PUT", "/operations/abc", Some(json!({"name": ""}))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json_body(response).await;
        let detail = body["detail"].as_array().unwrap();
        assert_eq!(detail.len(), 2);
        assert_eq!(detail[0]["type"], "int_parsing");
        assert_eq!(detail[0]["loc"], json!(["path", "id"]));
        assert_eq!(detail[1]["type"], "string_too_short");
        assert_eq!(detail[1]["loc"], json!(["body", "name"]));
    }

    #[tokio::test]
    async fn out_of_range_update_with_bad_body_is_422() {
        let app = app();
        let response = send(&app, "PUT", "/operations/3000000000", Some(json!({"name": ""}))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["detail"][0]["type"], "string_too_short");
    }

    #[tokio::test]
    async fn shutdown_forwarding_task_can_be_aborted() {
        let pending = forward_shutdown(std::future::pending(), axum_server::Handle::new());
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());

        let resolved = forward_shutdown(async {}, axum_server::Handle::new());
        tokio::time::timeout(Duration::from_secs(1), resolved)
            .await
            .expect("forwarding finishes once shutdown resolves")
            .unwrap();
    }

    #[tokio::test]
    async fn missing_field_is_422_with_request_line() {
        let app = app();
        let response = send(&app, "POST", "/operations/", Some(json!({"name": "scan"}))).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json_body(response).await;
        assert_eq!(body["message"], "POST: http://localhost:8000/operations/");
        assert_eq!(body["detail"][0]["type"], "missing");
        assert_eq!(body["detail"][0]["loc"], json!(["body", "description"]));
    }

    #[tokio::test]
    async fn non_integer_id_is_422() {
        let app = app();
        let response = send(&app, "GET", "/operations/abc", None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = json_body(response).await;
        assert_eq!(body["detail"][0]["type"], "int_parsing");
        assert_eq!(body["detail"][0]["loc"], json!(["path", "id"]));
        assert_eq!(body["detail"][0]["input"], "abc");
    }

    #[tokio::test]
    async fn malformed_json_is_422() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/operations/")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["detail"][0]["type"], "json_invalid");
    }

    #[tokio::test]
    async fn storage_failure_is_500() {
        let app = module_with(Arc::new(FailingStore)).build_router();
        let response = send(&app, "GET", "/operations", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({"detail": "Internal Server Error"})
        );
    }

    #[tokio::test]
    async fn liveness_route_is_mounted() {
        let response = send(&app(), "GET", "/health/live", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn distinct_creates_grow_by_one_and_are_retrievable(
            names in prop::collection::hash_set("[a-z]{1,12}", 1..8)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let store = Arc::new(MemoryOperationStore::new());
                let app = module_with(store.clone()).build_router();

                for (count, name) in names.iter().enumerate() {
                    let response = create(&app, name, "d").await;
                    assert_eq!(response.status(), StatusCode::CREATED);
                    assert_eq!(store.len(), count + 1);

                    let id = json_body(response).await["id"].as_i64().unwrap();
                    let body = json_body(send(&app, "GET", &format!("/operations/{id}"), None).await).await;
                    assert_eq!(body["data"]["name"], name.as_str());
                }
            });
        }
    }
}
