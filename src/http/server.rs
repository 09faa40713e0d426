use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Config;
use crate::error::{Result, TriplegraphError};
use crate::extract::ExtractionMode;
use crate::pipeline::Pipeline;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .is_ok()
}

/// Application state shared across handlers
#[derive(Clone)]
pub(super) struct AppState {
    pub(super) pipeline: Arc<Pipeline>,
    pub(super) api_key: String,
    pub(super) allowed_origins: Vec<String>,
    pub(super) authless: bool,
    pub(super) default_mode: ExtractionMode,
    pub(super) default_graph_name: String,
}

impl AppState {
    /// Origin then bearer-key check; both skipped in authless mode
    pub(super) fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), Response> {
        if self.authless {
            return Ok(());
        }
        validate_origin(headers, &self.allowed_origins)?;
        validate_auth(headers, &self.api_key)
    }
}

/// HTTP front end for extraction and graph queries
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(pipeline: Arc<Pipeline>, config: &Config) -> Result<Self> {
        // API key is optional if authless mode is enabled
        let api_key = if config.http_server.authless {
            String::new()
        } else {
            std::env::var(&config.http_server.api_key_env).map_err(|_| {
                TriplegraphError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.http_server.api_key_env
                ))
            })?
        };

        Ok(Self {
            state: AppState {
                pipeline,
                api_key,
                allowed_origins: config.http_server.allowed_origins.clone(),
                authless: config.http_server.authless,
                default_mode: config.triplegraph.default_mode,
                default_graph_name: config.triplegraph.default_graph_name.clone(),
            },
        })
    }

    /// Run the HTTP server until it fails
    pub async fn run(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(TriplegraphError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            TriplegraphError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Starting HTTP API on http://{}", addr);
        if self.state.authless {
            log::warn!("Authless mode: requests are not authenticated");
        }

        axum::serve(listener, self.router()).await.map_err(|e| {
            TriplegraphError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    pub fn router(&self) -> Router {
        let cors = if self.state.allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .state
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/health", get(handlers::health))
            .route("/extract", post(handlers::extract))
            .route("/entities", get(handlers::entities))
            .route("/entities/:name/relations", get(handlers::relations))
            .route("/triples", get(handlers::triples))
            .route("/path", get(handlers::path))
            .route("/stats", get(handlers::stats))
            .route("/graphs/:name", delete(handlers::delete_graph))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Map a crate error onto an HTTP status and JSON body
pub(super) fn error_response(err: TriplegraphError) -> Response {
    let status = match &err {
        TriplegraphError::InvalidInput(_) | TriplegraphError::Parse(_) => StatusCode::BAD_REQUEST,
        TriplegraphError::EntityNotFound(_) => StatusCode::NOT_FOUND,
        TriplegraphError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        TriplegraphError::Llm(_) | TriplegraphError::Parser(_) => StatusCode::BAD_GATEWAY,
        TriplegraphError::Database(_) | TriplegraphError::GraphDb(_) | TriplegraphError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        log::error!("Request failed: {}", err);
    }

    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing Authorization header",
                    "message": "Use 'Authorization: Bearer <api-key>' header"
                })),
            )
                .into_response()
        })?;

    let Some(provided_key) = auth_header.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format",
                "message": "Use 'Authorization: Bearer <api-key>' header"
            })),
        )
            .into_response());
    };

    if provided_key != expected_key {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid API key" })),
        )
            .into_response());
    }

    Ok(())
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    // no list configured: local development
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // non-browser clients send no Origin
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::KnowledgeExtractor;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_validate_auth() {
        assert!(validate_auth(&headers(&[("authorization", "Bearer secret")]), "secret").is_ok());

        let missing = validate_auth(&HeaderMap::new(), "secret").unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong_scheme = validate_auth(&headers(&[("authorization", "Basic secret")]), "secret").unwrap_err();
        assert_eq!(wrong_scheme.status(), StatusCode::UNAUTHORIZED);

        let wrong_key = validate_auth(&headers(&[("authorization", "Bearer nope")]), "secret").unwrap_err();
        assert_eq!(wrong_key.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validate_origin() {
        let allowed = vec!["http://localhost:3000".to_string()];
        assert!(validate_origin(&HeaderMap::new(), &allowed).is_ok());
        assert!(validate_origin(&headers(&[("origin", "http://evil.example")]), &[]).is_ok());
        assert!(validate_origin(&headers(&[("origin", "http://localhost:3000")]), &allowed).is_ok());

        let denied = validate_origin(&headers(&[("origin", "http://evil.example")]), &allowed).unwrap_err();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_authless_skips_checks() {
        let mut config = Config::default();
        config.http_server.authless = true;
        let server = ApiServer::new(Arc::new(Pipeline::new(KnowledgeExtractor::new())), &config).unwrap();
        assert!(server.state.authorize(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn test_server_requires_api_key_env() {
        let mut config = Config::default();
        config.http_server.authless = false;
        config.http_server.api_key_env = "TRIPLEGRAPH_TEST_UNSET_API_KEY".to_string();
        let err = ApiServer::new(Arc::new(Pipeline::new(KnowledgeExtractor::new())), &config)
            .err()
            .unwrap();
        assert!(matches!(err, TriplegraphError::Config(_)));
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_response(TriplegraphError::InvalidInput("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(TriplegraphError::EntityNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(TriplegraphError::Llm("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    const NOBEL: &str = "1\tEinstein\tEinstein\tPROPN\t_\t_\t2\tnsubj\t_\t_
2\twon\twin\tVERB\t_\t_\t0\troot\t_\t_
3\tNobel\tNobel\tPROPN\t_\t_\t4\tcompound\t_\t_
4\tPrize\tPrize\tPROPN\t_\t_\t2\tobj\t_\t_
";

    /// Serve the router on an ephemeral port backed by a SQLite store
    async fn spawn_server(dir: &tempfile::TempDir) -> String {
        use crate::extract::ConlluInput;
        use crate::store::SqliteStore;

        let migrations = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let store = SqliteStore::open(&dir.path().join("graph.db"), &migrations)
            .await
            .unwrap();
        let pipeline = Pipeline::new(KnowledgeExtractor::new().with_parser(Box::new(ConlluInput)))
            .with_store(Arc::new(store));
        let server = ApiServer {
            state: AppState {
                pipeline: Arc::new(pipeline),
                api_key: "secret".to_string(),
                allowed_origins: Vec::new(),
                authless: false,
                default_mode: ExtractionMode::Dependency,
                default_graph_name: "default".to_string(),
            },
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = server.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_routes_over_http() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();
        let get = |path: &str| client.get(format!("{}{}", base, path)).bearer_auth("secret");

        let health: serde_json::Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["store"], "sqlite");

        let report: serde_json::Value = client
            .post(format!("{}/extract", base))
            .bearer_auth("secret")
            .json(&serde_json::json!({ "text": NOBEL, "graph_name": "nobel" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["stored_in"], "nobel");
        assert_eq!(report["triples"][0]["object"], "Nobel Prize");

        let entities: serde_json::Value = get("/entities?graph=nobel").send().await.unwrap().json().await.unwrap();
        assert_eq!(entities["entities"], serde_json::json!(["Einstein", "Nobel Prize"]));

        let relations: serde_json::Value = get("/entities/Nobel%20Prize/relations?graph=nobel")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(relations["entity"], "Nobel Prize");
        assert_eq!(
            relations["relations"],
            serde_json::json!([{"subject": "Einstein", "predicate": "win", "object": "Nobel Prize"}])
        );

        let triples: serde_json::Value = get("/triples").send().await.unwrap().json().await.unwrap();
        assert_eq!(triples["triples"].as_array().unwrap().len(), 1);

        let path: serde_json::Value = get("/path?from=Einstein&to=Nobel%20Prize")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(path["nodes"], serde_json::json!(["Einstein", "Nobel Prize"]));
        assert_eq!(path["relationships"], serde_json::json!(["win"]));

        let missing = get("/path?from=Nobel%20Prize&to=Einstein").send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let stats: serde_json::Value = get("/stats?graph=nobel").send().await.unwrap().json().await.unwrap();
        assert_eq!(stats, serde_json::json!({"num_entities": 2, "num_relationships": 1}));

        let deleted = client
            .delete(format!("{}/graphs/nobel", base))
            .bearer_auth("secret")
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), reqwest::StatusCode::OK);
        let stats: serde_json::Value = get("/stats").send().await.unwrap().json().await.unwrap();
        assert_eq!(stats, serde_json::json!({"num_entities": 0, "num_relationships": 0}));
    }

    #[tokio::test]
    async fn test_router_auth_and_cors() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = spawn_server(&dir).await;
        let client = reqwest::Client::new();

        let unauthorized = client.get(format!("{}/triples", base)).send().await.unwrap();
        assert_eq!(unauthorized.status(), reqwest::StatusCode::UNAUTHORIZED);

        let bad_mode = client
            .post(format!("{}/extract", base))
            .bearer_auth("secret")
            .json(&serde_json::json!({ "text": NOBEL, "mode": "magic" }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_mode.status(), reqwest::StatusCode::BAD_REQUEST);

        let unknown = client.get(format!("{}/nope", base)).send().await.unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

        let cors = client
            .get(format!("{}/health", base))
            .header("origin", "http://localhost:3000")
            .send()
            .await
            .unwrap();
        assert_eq!(
            cors.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_check_port_available() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!check_port_available(port).await);
    }
}
