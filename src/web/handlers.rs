//! HTTP request handlers.

use super::AppState;
use crate::error::EngineError;
use crate::query::ParamBag;
use crate::stream::{FrameSender, FRAME_BUFFER};
use crate::widgets::{execute, execute_multi_page, prepare_run_stream};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::convert::Infallible;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Errors
// ============================================================================

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidParams(_) | EngineError::PlaceholderUnbound(_) => StatusCode::BAD_REQUEST,
            EngineError::Canceled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

fn json_bytes(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

// ============================================================================
// API: Widgets
// ============================================================================

pub async fn handle_widget(
    State(state): State<AppState>,
    Path(widget_id): Path<String>,
    Json(params): Json<ParamBag>,
) -> Result<Response, EngineError> {
    // Dropping the request future cancels every search still in flight.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let ctx = state.engine.context(cancel);

    let bytes = execute(&widget_id, &params, &ctx).await?;
    if bytes.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(json_bytes(bytes))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub cursor: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    payload: Box<RawValue>,
    next_cursor: Option<usize>,
}

pub async fn handle_widget_page(
    State(state): State<AppState>,
    Path(widget_id): Path<String>,
    Query(page): Query<PageQuery>,
    Json(params): Json<ParamBag>,
) -> Result<Response, EngineError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let ctx = state.engine.context(cancel);

    let (bytes, next_cursor) = execute_multi_page(&widget_id, &params, page.cursor, &ctx).await?;
    if bytes.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let payload = RawValue::from_string(String::from_utf8_lossy(&bytes).into_owned())?;
    Ok(Json(PageResponse { payload, next_cursor }).into_response())
}

// ============================================================================
// API: Streams
// ============================================================================

pub async fn handle_completed_runs_stream(
    State(state): State<AppState>,
    Json(params): Json<ParamBag>,
) -> Result<Response, EngineError> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let ctx = state.engine.context(cancel);

    // Every query runs before the response is committed, so failures keep their status.
    let runs = prepare_run_stream(&params, &ctx).await?;
    let (sender, rx) = FrameSender::channel(FRAME_BUFFER);

    tokio::spawn(async move {
        match runs.send(&ctx, &sender).await {
            Ok(frames) => tracing::debug!("Streamed {} completed-run frames", frames),
            Err(EngineError::Canceled) => tracing::debug!("Completed-run stream canceled by client"),
            Err(e) => tracing::error!("Completed-run stream failed: {}", e),
        }
    });

    // The guard lives as long as the response body; a client hang-up cancels the producer.
    let frames = ReceiverStream::new(rx).map(move |line| {
        let _ = &guard;
        Ok::<_, Infallible>(line)
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(frames),
    )
        .into_response())
}

// ============================================================================
// Health
// ============================================================================

pub async fn handle_healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
