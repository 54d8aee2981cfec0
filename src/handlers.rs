use crate::app::AppState;
use crate::error::{AppError, AppResult, RelayError};
use crate::relay::{self, RelayContext};
use crate::request::{ChatRequest, build_messages};
use crate::upstream;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response, Sse};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "models": state.registry.configured_models() }))
}

/// `POST /api/chat/`: relays one chat request as an SSE stream of
/// `{"content", "reasoning_content"}` events.
///
/// Everything up to the upstream answering is a setup failure and becomes an
/// error response; anything after that is reported in-stream.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let request_id =
        extract_request_id(&headers).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let Json(req) = body.map_err(|rejection| invalid_body(&request_id, rejection))?;

    let provider = state
        .registry
        .resolve(&req.model_name)
        .map_err(|err| setup_failure(&request_id, &req.model_name, err.into()))?;

    let messages = build_messages(req.prompt.as_deref(), &req.messages);
    tracing::debug!(
        request_id = %request_id,
        model = %req.model_name,
        upstream_model = %provider.upstream_model_id,
        messages = messages.len(),
        max_tokens = req.max_tokens,
        "opening upstream stream"
    );

    let source = upstream::open_stream(
        &state.http,
        provider,
        &messages,
        req.max_tokens,
        req.temperature,
        state.runtime.upstream_timeout,
    )
    .await
    .map_err(|err| setup_failure(&request_id, &req.model_name, err.into()))?;

    let rx = relay::spawn_relay(
        source,
        RelayContext {
            request_id,
            model: req.model_name,
        },
    );
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(frame.into_sse_event()));
    Ok(Sse::new(stream).into_response())
}

fn setup_failure(request_id: &str, model: &str, err: RelayError) -> AppError {
    tracing::warn!(
        request_id = %request_id,
        model = %model,
        code = err.code(),
        "chat setup failed: {err}"
    );
    metrics::counter!("chatrelay_setup_failures_total", "code" => err.code()).increment(1);
    err.into()
}

fn invalid_body(request_id: &str, rejection: JsonRejection) -> AppError {
    let message = rejection.body_text();
    tracing::warn!(request_id = %request_id, "rejecting chat request body: {message}");
    metrics::counter!("chatrelay_setup_failures_total", "code" => "invalid_request_body")
        .increment(1);
    AppError::new(rejection.status(), "invalid_request_body", message)
}

fn extract_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
