//! The hosting-node agent: receives work units over HTTP, authorizes each one
//! against the node's own policy and runs it against the local filesystem.

use crate::{
    channel::{
        authority::{authorize_unit, Authority},
        types::{CallRequest, CallResponse, Capabilities, UnitInfo, WorkUnit},
    },
    config::Agent,
    errors::{into_response, AppError},
    security,
    syntax::Platform,
    units,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Agent>,
    pub authority: Arc<dyn Authority>,
    pub rls: security::RateLimiters,
    /// Reported to callers so they judge paths by this node's rules.
    pub platform: Platform,
}

impl AppState {
    pub fn new(cfg: Agent, authority: Arc<dyn Authority>) -> Self {
        let rls = security::RateLimiters::new(
            cfg.rate_per_token,
            cfg.burst_per_token,
            cfg.rate_global,
            cfg.burst_global,
        );
        Self { cfg: Arc::new(cfg), authority, rls, platform: Platform::host() }
    }
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", state.cfg.bind_addr, state.cfg.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, base_path = %state.cfg.base_path, "agent listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub fn build_router(shared: AppState) -> Router {
    let base = shared.cfg.base_path.trim_end_matches('/').to_string();
    let limit_bytes = shared.cfg.max_request_kb * 1024;
    Router::new()
        .route("/healthz", get(health))
        .route(&format!("{base}/capabilities"), get(capabilities))
        .route(
            &format!("{base}/call"),
            post(call).layer(RequestBodyLimitLayer::new(limit_bytes)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match authorize(&state, &headers) {
        Ok(()) => (StatusCode::OK, Json(json!({"status":"ok"}))).into_response(),
        Err(e) => into_response(e).into_response(),
    }
}

async fn capabilities(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return into_response(e).into_response();
    }
    let units = WorkUnit::ALL_NAMES
        .iter()
        .filter_map(|n| WorkUnit::role_of(n).map(|role| UnitInfo { name: n.to_string(), role }))
        .collect();
    let caps = Capabilities {
        protocol_version: "1.0".into(),
        node: state.cfg.bind_addr.clone(),
        platform: state.platform,
        units,
    };
    (StatusCode::OK, Json(caps)).into_response()
}

async fn call(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CallRequest>,
) -> Response {
    let started = Instant::now();
    let origin = headers
        .get("Origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let unit_name = req.unit.name();

    let admitted = authorize(&state, &headers)
        .and_then(|()| security::content_length_ok(&headers, state.cfg.max_request_kb))
        .and_then(|()| state.rls.check(security::extract_bearer(&headers).as_deref()));
    if let Err(e) = admitted {
        audit(&req.id, &origin, unit_name, "deny", e.code(), started);
        return into_response(e).into_response();
    }

    let outcome = authorize_unit(Some(state.authority.as_ref()), &req.unit)
        .and_then(|()| units::execute(&req.unit));
    match outcome {
        Ok(result) => {
            audit(&req.id, &origin, unit_name, "allow", "OK", started);
            let body = CallResponse { id: req.id, result: Some(result), error: None };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            let decision = if matches!(e, AppError::AuthorizationDenied(_)) { "deny" } else { "error" };
            audit(&req.id, &origin, unit_name, decision, e.code(), started);
            let status = e.status();
            let body = CallResponse { id: req.id, result: None, error: Some(e.to_wire()) };
            (status, Json(body)).into_response()
        }
    }
}

fn audit(request_id: &str, origin: &str, unit: &str, decision: &str, code: &str, started: Instant) {
    tracing::info!(
        request_id = request_id,
        origin = origin,
        unit = unit,
        decision = decision,
        code = code,
        duration_ms = started.elapsed().as_millis() as u64,
        "audit"
    );
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    security::require_bearer(headers, &state.cfg.bearer_token)?;
    security::check_origin(headers, &state.cfg.allowed_origins)?;
    Ok(())
}
