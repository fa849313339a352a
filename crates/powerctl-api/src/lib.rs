//! ---
//! pc_section: "05-networking-external-interfaces"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "HTTP control surface for host power actions."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
//! Routes:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | GET | `/` | operator page |
//! | POST | `/shutdown` | power off |
//! | POST | `/restart` | reboot |
//! | POST | `/restart-bios` | reboot into firmware setup |
//!
//! Action routes accept an optional `{"delaySeconds": n}` body and always answer
//! with `{"message": "..."}`.

use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use powerctl_core::{PowerActionError, PowerActionKind, PowerActionResult, PowerController};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared state injected into the handlers.
pub struct ApiState {
    controller: PowerController,
}

impl ApiState {
    pub fn new(controller: PowerController) -> Self {
        Self { controller }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("platform", &self.controller.platform())
            .finish_non_exhaustive()
    }
}

/// Response envelope used for every JSON answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

/// Build the control surface router.
pub fn router(controller: PowerController) -> Router {
    let state = Arc::new(ApiState::new(controller));
    Router::new()
        .route("/", get(get_index))
        .route(
            PowerActionKind::Shutdown.path(),
            post(post_shutdown).fallback(method_not_allowed),
        )
        .route(
            PowerActionKind::Restart.path(),
            post(post_restart).fallback(method_not_allowed),
        )
        .route(
            PowerActionKind::RestartToFirmware.path(),
            post(post_restart_bios).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    info!(method = %request.method(), path = %request.uri().path(), "request");
    next.run(request).await
}

async fn get_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn post_shutdown(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    power_action(&state, PowerActionKind::Shutdown, &body).await
}

async fn post_restart(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    power_action(&state, PowerActionKind::Restart, &body).await
}

async fn post_restart_bios(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    power_action(&state, PowerActionKind::RestartToFirmware, &body).await
}

async fn power_action(state: &ApiState, kind: PowerActionKind, body: &[u8]) -> Response {
    let result = state.controller.perform(kind, body).await;
    result_response(result)
}

fn result_response(result: PowerActionResult) -> Response {
    let status =
        StatusCode::from_u16(result.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(MessageBody {
            message: result.message,
        }),
    )
        .into_response()
}

async fn method_not_allowed() -> (StatusCode, String) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        PowerActionError::MethodNotAllowed.public_message(),
    )
}

async fn not_found() -> (StatusCode, Json<MessageBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(MessageBody {
            message: "not found".to_owned(),
        }),
    )
}
