//! MCP-compatible HTTP server.
//!
//! Exposes the advisory tools over two surfaces backed by one registry:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name with a JSON body |
//! | `*`    | `/mcp` | MCP Streamable HTTP endpoint (JSON-RPC) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! REST error responses carry a machine-readable code and message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must be a non-empty string" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `retrieval_unavailable`
//! (503), `internal` (500). The MCP endpoint reports tool failures inside
//! the JSON-RPC result instead, per protocol.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin tool calls.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::error::WisdomError;
use crate::mcp::McpBridge;
use crate::store::ChunkStore;
use crate::synthesis;
use crate::tools::{ToolInfo, ToolRegistry};
use crate::wisdom::WisdomEngine;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: Arc<WisdomEngine>,
    tools: Arc<ToolRegistry>,
}

/// Starts the advisory server.
///
/// Connects to the store, constructs the embedding and synthesis
/// providers from config, and serves until the process is terminated.
/// This is the entry point behind `sage serve`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    let store = Arc::new(ChunkStore::new(pool));
    let embedder: Arc<dyn embedding::EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let synthesizer: Arc<dyn synthesis::SynthesisProvider> =
        Arc::from(synthesis::create_provider(&config.synthesis)?);

    if !config.embedding.is_enabled() {
        eprintln!(
            "warning: embedding provider is disabled; search tools will report retrieval errors"
        );
    }

    let engine = Arc::new(WisdomEngine::new(
        store,
        embedder,
        synthesizer,
        config.retrieval.clone(),
    ));
    let tools = Arc::new(ToolRegistry::with_builtins());

    println!("Registered {} tools:", tools.len());
    for t in tools.tools() {
        println!("  POST /tools/{} - {}", t.name(), t.description());
    }

    let state = AppState {
        engine: engine.clone(),
        tools: tools.clone(),
    };

    let bridge = McpBridge::new(engine, tools);
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(state);

    println!("Advisory server listening on http://{}", bind_addr);
    println!("MCP endpoint at http://{}/mcp", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

/// Map a tool failure to the right HTTP status: invalid arguments are the
/// caller's fault, provider outages are temporary, everything else is a
/// server fault.
fn tool_error(tool_name: &str, err: WisdomError) -> AppError {
    let (status, code) = match &err {
        WisdomError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        WisdomError::RetrievalUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "retrieval_unavailable")
        }
        WisdomError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    AppError {
        status,
        code,
        message: format!("{}: {}", tool_name, err),
    }
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

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.tools.infos(),
    })
}

// ============ POST /tools/{name} ============

/// Unified tool dispatch. Returns `404` for an unknown tool name and the
/// mapped status from [`tool_error`] for execution failures.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    let result = tool
        .execute(params, &state.engine)
        .await
        .map_err(|e| tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
