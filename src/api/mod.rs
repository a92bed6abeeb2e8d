mod containers;
pub mod error;
mod hosts;
pub mod metrics;
mod services;

use axum::{
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use error::{ApiError, ErrorCode};

/// Bare acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Containers
        .route("/lxc", post(containers::create_container))
        .route("/lxc", get(containers::list_containers))
        .route("/lxc", put(containers::update_container_status))
        .route("/lxc", delete(containers::delete_container))
        .route("/lxc/:id", get(containers::get_container))
        // Container services
        .route("/lxc/services", post(services::create_service))
        .route("/lxc/services", get(services::list_services))
        .route("/lxc/services", put(services::update_service_status))
        // Hosts
        .route("/lxd", get(hosts::list_hosts))
        .route("/lxd", post(hosts::register_host))
        .route("/lxd/:lxd_name/lxc", get(containers::list_containers_on_host));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/v1", api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.server.request_timeout(),
        ))
        .layer(middleware::map_response(json_error_body))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<MessageResponse> {
    Json(MessageResponse::new("OK"))
}

async fn not_found() -> ApiError {
    ApiError::not_found("no such route")
}

/// Give the bodyless 405 and 408 responses produced by routing and the
/// timeout layer the same JSON envelope as every other error.
async fn json_error_body(response: Response) -> Response {
    if response.headers().contains_key(header::CONTENT_TYPE) {
        return response;
    }

    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => {
            let allow = response.headers().get(header::ALLOW).cloned();
            let mut mapped =
                ApiError::new(ErrorCode::MethodNotAllowed, "method not allowed").into_response();
            if let Some(allow) = allow {
                mapped.headers_mut().insert(header::ALLOW, allow);
            }
            mapped
        }
        StatusCode::REQUEST_TIMEOUT => {
            ApiError::new(ErrorCode::RequestTimeout, "request timed out").into_response()
        }
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Container;
    use crate::testing::{harness, register, Harness};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(h: &Harness) -> Router {
        let state = AppState::new(Config::default(), h.scheduler.clone());
        create_router(Arc::new(state))
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ORIGIN, "http://dashboard.local");
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{} {}",
            status,
            uri
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create(router: &Router, name: &str) -> Value {
        let (status, body) = send(
            router,
            Method::POST,
            "/api/v1/lxc",
            Some(json!({"name": name, "alias": "ubuntu"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }

    #[tokio::test]
    async fn test_create_with_empty_fleet() {
        let h = harness(false).await;
        let router = router(&h);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/lxc",
            Some(json!({"name": "c1", "alias": "ubuntu"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "placement_failed");
        assert!(body["error"].as_str().unwrap().contains("10.0.0.1"));

        let (_, list) = send(&router, Method::GET, "/api/v1/lxc", None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_create_on_single_host() {
        let h = harness(false).await;
        let h1 = register(&h.db, "h1", "10.0.0.1").await;
        let router = router(&h);

        let body = create(&router, "c1").await;
        assert_eq!(body["name"], "c1");
        assert_eq!(body["alias"], "ubuntu");
        assert_eq!(body["host_id"], h1.id.as_str());
        assert_eq!(body["status"], "creating");
        assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_status_update_then_invalid_transition() {
        let h = harness(false).await;
        register(&h.db, "h1", "10.0.0.1").await;
        let router = router(&h);
        let id = create(&router, "c1").await["id"].clone();

        let (status, body) = send(
            &router,
            Method::PUT,
            "/api/v1/lxc",
            Some(json!({"id": id, "status": "running"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let (_, list) = send(&router, Method::GET, "/api/v1/lxc", None).await;
        assert_eq!(list[0]["id"], id);
        assert_eq!(list[0]["status"], "running");
        assert_eq!(list[0]["host_name"], "h1");
        assert_eq!(list[0]["container_name"], "c1");
        assert_eq!(list[0]["image"], "ubuntu");

        let (status, body) = send(
            &router,
            Method::PUT,
            "/api/v1/lxc",
            Some(json!({"id": id, "status": "creating"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "invalid_transition");

        let (_, container) = send(
            &router,
            Method::GET,
            &format!("/api/v1/lxc/{}", id.as_str().unwrap()),
            None,
        )
        .await;
        assert_eq!(container["status"], "running");
    }

    #[tokio::test]
    async fn test_tied_hosts_get_both_creates() {
        let h = harness(false).await;
        register(&h.db, "h1", "10.0.0.1").await;
        register(&h.db, "h2", "10.0.0.2").await;
        let router = router(&h);

        let (a, b) = tokio::join!(create(&router, "a"), create(&router, "b"));
        assert_ne!(a["id"], b["id"]);

        let (status, on_h1) = send(&router, Method::GET, "/api/v1/lxd/h1/lxc", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(on_h1.as_array().unwrap().len(), 2);

        let (status, body) = send(&router, Method::GET, "/api/v1/lxd/h9/lxc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_delete_removes_services() {
        let h = harness(false).await;
        register(&h.db, "h1", "10.0.0.1").await;
        let router = router(&h);
        let id = create(&router, "web").await["id"].clone();

        for (inside, outside) in [(80, 8080), (443, 8443)] {
            let (status, body) = send(
                &router,
                Method::POST,
                "/api/v1/lxc/services",
                Some(json!({
                    "service": "http",
                    "container_id": id,
                    "container_port": inside,
                    "host_port": outside,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{}", body);
            assert_eq!(body["container_name"], "web");
        }

        let (status, body) =
            send(&router, Method::DELETE, "/api/v1/lxc", Some(json!({"id": id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "container deleted");

        let (_, services) = send(&router, Method::GET, "/api/v1/lxc/services", None).await;
        assert_eq!(services, json!([]));

        let (status, body) =
            send(&router, Method::DELETE, "/api/v1/lxc", Some(json!({"id": id}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_duplicate_port_pair_conflicts() {
        let h = harness(false).await;
        register(&h.db, "h1", "10.0.0.1").await;
        let router = router(&h);
        let id = create(&router, "web").await["id"].clone();
        let mapping = json!({"service": "ssh", "container_id": id, "container_port": 22, "host_port": 2222});

        let (status, _) = send(&router, Method::POST, "/api/v1/lxc/services", Some(mapping.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&router, Method::POST, "/api/v1/lxc/services", Some(mapping)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "conflict");
    }

    #[tokio::test]
    async fn test_bad_input_is_400() {
        let h = harness(false).await;
        let router = router(&h);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/lxc")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());

        let (status, _) = send(
            &router,
            Method::PUT,
            "/api/v1/lxc",
            Some(json!({"id": uuid::Uuid::new_v4(), "status": "paused"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            Method::DELETE,
            "/api/v1/lxc",
            Some(json!({"id": "not-a-uuid"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, Method::GET, "/api/v1/lxc/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/v1/lxc/services",
            Some(json!({"service": "x", "container_id": uuid::Uuid::new_v4(), "container_port": 0, "host_port": 80})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_outage_is_503() {
        let h = harness(false).await;
        register(&h.db, "h1", "10.0.0.1").await;
        *h.metrics.ip.lock() = None;
        let router = router(&h);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/v1/lxc",
            Some(json!({"name": "c1", "alias": "ubuntu"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "metrics_unavailable");
    }

    #[tokio::test]
    async fn test_host_registration() {
        let h = harness(false).await;
        let router = router(&h);

        let (status, host) = send(
            &router,
            Method::POST,
            "/api/v1/lxd",
            Some(json!({"name": "h1", "ip": "10.0.0.1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(host["name"], "h1");

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/v1/lxd",
            Some(json!({"name": "h1", "ip": "10.0.0.2"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, hosts) = send(&router, Method::GET, "/api/v1/lxd", None).await;
        assert_eq!(hosts.as_array().unwrap().len(), 1);

        // The registered host is immediately eligible for placement
        let body = create(&router, "c1").await;
        let stored: Container = serde_json::from_value(body).unwrap();
        assert_eq!(stored.host_id, host["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_unknown_route_and_health() {
        let h = harness(false).await;
        let router = router(&h);

        let (status, body) = send(&router, Method::GET, "/api/v1/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");

        let (status, body) = send(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "OK");
    }

    #[tokio::test]
    async fn test_wrong_method_gets_json_error() {
        let h = harness(false).await;
        let router = router(&h);

        let (status, body) = send(&router, Method::PATCH, "/api/v1/lxc", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["code"], "method_not_allowed");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_timeout_gets_json_error() {
        let bare = axum::http::Response::builder()
            .status(StatusCode::REQUEST_TIMEOUT)
            .body(Body::empty())
            .unwrap();

        let response = json_error_body(bare).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "request_timeout");
    }
}
