use crate::config::{Config, CorsConfig, McpConfig};
use crate::mcp::{ChannelPublisher, Dispatcher, HandlerRegistry};
use crate::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes;

#[derive(Clone)]
pub struct AppState {
    pub mcp: Arc<McpConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub publisher: Arc<ChannelPublisher>,
}

pub struct ApiServer {
    state: AppState,
    cors_config: CorsConfig,
    max_body_size: usize,
}

impl ApiServer {
    pub fn new(config: &Config, registry: HandlerRegistry, publisher: Arc<ChannelPublisher>) -> Self {
        let dispatcher = Dispatcher::new(Arc::new(registry))
            .with_handler_timeout(config.dispatch.handler_timeout());

        tracing::debug!(
            "MCP server {} with methods {:?}",
            config.mcp.name,
            dispatcher.registry().methods()
        );

        Self {
            state: AppState {
                mcp: Arc::new(config.mcp.clone()),
                dispatcher: Arc::new(dispatcher),
                publisher,
            },
            cors_config: config.server.cors.clone(),
            max_body_size: config.server.max_body_size,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    /// Session lifecycle and MCP method routes, relative to the prefix
    pub fn routes(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(routes::session_start))
            .route("/endpoint", get(routes::endpoint));

        for method in routes::RPC_METHODS {
            router = router.route(&format!("/{}", method), post(routes::mcp_request));
        }
        for method in routes::ACK_METHODS {
            router = router.route(&format!("/{}", method), post(routes::empty_response));
        }
        router = router.route(
            &format!("/{}", routes::CANCELLED_METHOD),
            post(routes::cancelled),
        );

        router.with_state(self.state.clone())
    }

    /// Routes nested under the configured prefix, with HTTP layers applied
    pub fn router(&self) -> Router {
        let prefix = self.state.mcp.prefix();
        tracing::info!("MCP routes mounted at {}", prefix);

        Router::new()
            .nest(&prefix, self.routes())
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str) -> Result<()> {
        self.serve_router(addr, self.router()).await
    }

    /// Serve `router` (normally `self.router()` merged with extra routes)
    /// until Ctrl-C
    pub async fn serve_router(&self, addr: &str, router: Router) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::envelope::error_codes;
    use crate::mcp::HandlerError;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_server() -> ApiServer {
        let mut config = Config::default();
        config.mcp.name = "videoparse".to_string();

        let mut registry = HandlerRegistry::new();
        registry.register_fn("tools/list", |_req, _ctx| async { Ok(json!({"tools": []})) });
        registry.register_fn("initialize", |req, ctx| async move {
            Ok(json!({
                "session": ctx.session_id(),
                "params": req.params,
            }))
        });
        registry.register_fn("prompts/get", |_req, _ctx| async {
            Err(HandlerError::new(-32001, "no such prompt"))
        });

        let publisher = ChannelPublisher::new("videoparse", None, Duration::from_secs(1)).unwrap();
        ApiServer::new(&config, registry, Arc::new(publisher))
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    fn post_json(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_routes_match_under_prefix() {
        let router = test_server().router();

        for method in routes::RPC_METHODS
            .iter()
            .chain(routes::ACK_METHODS.iter())
            .chain([routes::CANCELLED_METHOD].iter())
        {
            let path = format!("/mcp/videoparse/{}", method);
            let (status, _, _) = send(&router, post_json(&path, "{}")).await;
            assert_eq!(status, StatusCode::OK, "POST {} should be routed", path);
        }

        let (status, _, _) = send(&router, post_json("/tools/list", "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_session_start_redirects() {
        let router = test_server().router();
        let req = Request::builder()
            .uri("/mcp/videoparse")
            .body(Body::empty())
            .unwrap();

        let (status, headers, body) = send(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
        assert_eq!(headers[routes::BUFFERING_HEADER], "no");

        let redirect = headers[routes::REDIRECT_HEADER].to_str().unwrap();
        let session = redirect.strip_prefix("/internal/videoparse/").unwrap();
        assert!(uuid::Uuid::parse_str(session).is_ok());
    }

    #[tokio::test]
    async fn test_session_ids_are_fresh() {
        let router = test_server().routes();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..5 {
            let req = Request::builder().uri("/").body(Body::empty()).unwrap();
            let (_, headers, _) = send(&router, req).await;
            let redirect = headers[routes::REDIRECT_HEADER].to_str().unwrap().to_string();
            assert!(seen.insert(redirect));
        }
    }

    #[tokio::test]
    async fn test_unbound_method_reports_not_found_in_body() {
        let router = test_server().routes();
        let (status, _, body) = send(
            &router,
            post_json(
                "/tools/call",
                r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"x"}}"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32601, "message": "Method not found"}})
        );
    }

    #[tokio::test]
    async fn test_null_id_echoed_over_route() {
        let router = test_server().routes();
        let (status, _, body) = send(
            &router,
            post_json("/tools/list", r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"jsonrpc": "2.0", "id": null, "result": {"tools": []}}));
    }

    #[tokio::test]
    async fn test_handler_error_code_preserved() {
        let router = test_server().routes();
        let (_, _, body) = send(
            &router,
            post_json("/prompts/get", r#"{"jsonrpc":"2.0","id":"p","method":"prompts/get"}"#),
        )
        .await;

        assert_eq!(body["id"], "p");
        assert_eq!(body["error"]["code"], -32001);
        assert_eq!(body["error"]["message"], "no such prompt");
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_session_header_threaded_into_meta() {
        let router = test_server().routes();
        let req = Request::builder()
            .method("POST")
            .uri("/initialize")
            .header(routes::SESSION_HEADER, "abc123")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"_meta":{"sessionId":"forged"}}}"#,
            ))
            .unwrap();

        let (_, _, body) = send(&router, req).await;
        assert_eq!(body["result"]["session"], "abc123");
        assert_eq!(body["result"]["params"]["_meta"]["sessionId"], "abc123");
    }

    #[tokio::test]
    async fn test_no_meta_is_not_fabricated() {
        let router = test_server().routes();
        let req = Request::builder()
            .method("POST")
            .uri("/initialize")
            .header(routes::SESSION_HEADER, "abc123")
            .body(Body::from(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"clientInfo":{}}}"#,
            ))
            .unwrap();

        let (_, _, body) = send(&router, req).await;
        assert_eq!(body["result"]["session"], Value::Null);
        assert_eq!(body["result"]["params"], json!({"clientInfo": {}}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_200_fault() {
        let router = test_server().routes();

        let (status, _, body) = send(&router, post_json("/tools/list", "{not json")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], error_codes::SERVER_FAULT);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Internal server error: "));

        // Parsable JSON without a method keeps its id
        let (status, _, body) = send(&router, post_json("/tools/list", r#"{"id": 9}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 9);
        assert_eq!(body["error"]["code"], error_codes::SERVER_FAULT);
    }

    #[tokio::test]
    async fn test_ack_methods_never_fail() {
        let router = test_server().routes();
        let cases = [
            ("/ping", r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#, json!(7)),
            ("/ping", "", json!("")),
            ("/notifications/initialized", r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, json!("")),
            ("/notifications/cancelled", "garbage", json!("")),
            ("/notifications/cancelled", r#"{"id":"c1","params":{"requestId":99}}"#, json!("c1")),
        ];

        for (path, body, expected_id) in cases {
            for _ in 0..2 {
                let (status, _, resp) = send(&router, post_json(path, body)).await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(resp, json!({"jsonrpc": "2.0", "id": expected_id, "result": {}}));
            }
        }
    }

    #[tokio::test]
    async fn test_endpoint_without_session_is_200() {
        let router = test_server().routes();
        let req = Request::builder()
            .uri("/endpoint")
            .header(routes::TRANSPORT_HEADER, "sse")
            .body(Body::empty())
            .unwrap();

        let (status, _, body) = send(&router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_endpoint_with_unconfigured_publisher_is_200() {
        let router = test_server().routes();
        let req = Request::builder()
            .uri("/endpoint")
            .header(routes::TRANSPORT_HEADER, "sse")
            .header(routes::SESSION_HEADER, "abc123")
            .body(Body::empty())
            .unwrap();

        let (status, _, _) = send(&router, req).await;
        assert_eq!(status, StatusCode::OK);
    }
}
