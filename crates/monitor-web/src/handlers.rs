//! Plain HTTP endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use monitor_core::process::ControlAction;

use crate::error::ApiError;
use crate::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub(crate) async fn index(State(state): State<AppState>) -> Html<String> {
    Html(INDEX_HTML.replace("{{BOT_NAME}}", &escape_html(state.monitor.bot_name())))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommandRequest {
    command: String,
}

/// 202 once written to the shell, 204 for a blank command, 503 when the
/// shell is gone.
pub(crate) async fn submit_command(
    State(state): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> Result<StatusCode, ApiError> {
    if req.command.trim().is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }
    state.monitor.submit_command(&req.command).await?;
    Ok(StatusCode::ACCEPTED)
}

pub(crate) async fn control(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let action: ControlAction = action.parse()?;
    state.monitor.control(action).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Serialize)]
pub(crate) struct MetaResponse {
    uptime: i64,
    status: String,
}

pub(crate) async fn meta(State(state): State<AppState>) -> Json<MetaResponse> {
    let status = state.monitor.status().await;
    Json(MetaResponse {
        uptime: status.uptime,
        status: status.status,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    subscribers: usize,
    shell_alive: bool,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.monitor.subscriber_count(),
        shell_alive: state.monitor.shell_alive(),
    })
}
