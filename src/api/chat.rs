use std::io;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::llm::chat_stream::ChatStream;
use crate::llm::prompt::compose;
use crate::models::Turn;
use crate::search::overlap::rank;
use crate::state::AppState;

pub const EMPTY_HISTORY_MESSAGE: &str = "history 不能为空";
const MISSING_TEXT_MESSAGE: &str = "最后一条消息缺少文本内容";

/// POST /api/chat — retrieve matching corpus lines, then stream the model's
/// answer back as plain text.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);
    handle_chat(state, payload, request_id).instrument(span).await
}

async fn handle_chat(
    state: AppState,
    payload: Result<Json<Value>, JsonRejection>,
    request_id: Uuid,
) -> Result<Response, ApiError> {
    // ── Step 1: Validate input ────────────────────────────
    let Json(body) = payload.map_err(|e| {
        tracing::debug!("Rejected chat payload: {e}");
        ApiError::bad_request(format!("请求体不是合法的 JSON: {}", e.body_text()))
    })?;
    let turns = parse_history(&body)?;
    let (latest, prior) = turns
        .split_last()
        .ok_or_else(|| ApiError::bad_request(EMPTY_HISTORY_MESSAGE))?;
    let latest_query = latest
        .first_text()
        .ok_or_else(|| ApiError::bad_request(MISSING_TEXT_MESSAGE))?;

    // ── Step 2: Acquire semaphore ─────────────────────────
    let permit = state
        .chat_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::ServiceUnavailable)?;

    // ── Step 3: Retrieve corpus lines ─────────────────────
    let retrieved = rank(
        latest_query,
        state.corpus.lines(),
        state.config.retrieval_top_k,
        state.config.scoring_mode,
    );
    tracing::info!(
        turns = turns.len(),
        retrieved = retrieved.len(),
        "Retrieved {} of {} corpus lines",
        retrieved.len(),
        state.corpus.len()
    );

    // ── Step 4: Build system instruction ──────────────────
    let system_instruction = compose(&state.persona, &retrieved, latest_query);

    // ── Step 5: Open the completion stream ────────────────
    let mut llm_stream = state
        .gateway
        .stream_complete(prior, &system_instruction, latest_query)
        .await
        .map_err(ApiError::internal)?;

    // ── Step 6: Wait for the first chunk before committing ─
    // Until a chunk arrives the caller can still get a proper 500.
    let idle_timeout = Duration::from_secs(state.config.idle_timeout_secs);
    let first = match tokio::time::timeout(idle_timeout, llm_stream.next()).await {
        Ok(Some(Ok(chunk))) => Some(chunk),
        Ok(Some(Err(e))) => return Err(ApiError::internal(e)),
        Ok(None) => None,
        Err(_) => {
            return Err(ApiError::internal(
                "LLM response timed out before the first chunk",
            ))
        }
    };

    // ── Step 7: Stream the rest ───────────────────────────
    let chunk_count = usize::from(first.is_some());
    let rest = forward_chunks(llm_stream, chunk_count, idle_timeout, request_id);
    let body_stream = stream::iter(first.map(|c| Ok::<_, io::Error>(Bytes::from(c))))
        .chain(rest)
        // Hold the semaphore permit for the lifetime of the body
        .map(move |chunk| {
            let _permit = &permit;
            chunk
        });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// Extract and type-check `history`. Missing, non-array and empty all get the
/// same message.
fn parse_history(body: &Value) -> Result<Vec<Turn>, ApiError> {
    let items = match body.get("history") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(ApiError::bad_request(EMPTY_HISTORY_MESSAGE)),
    };

    items
        .iter()
        .map(|item| Turn::deserialize(item))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::bad_request(format!("history 格式不正确: {e}")))
}

/// Forward upstream chunks as body bytes, in order.
///
/// A mid-stream failure becomes a body error so the transport aborts the
/// response instead of ending it cleanly; callers can tell truncation from a
/// complete answer.
fn forward_chunks(
    llm_stream: ChatStream,
    already_sent: usize,
    idle_timeout: Duration,
    request_id: Uuid,
) -> impl futures_util::Stream<Item = Result<Bytes, io::Error>> + Send {
    stream::unfold(
        Some((llm_stream, already_sent)),
        move |state| async move {
            let (mut llm_stream, sent) = state?;
            match tokio::time::timeout(idle_timeout, llm_stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    Some((Ok(Bytes::from(chunk)), Some((llm_stream, sent + 1))))
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!(%request_id, "Upstream failed after {sent} chunks: {e:#}");
                    Some((Err(io::Error::other("upstream generation failed")), None))
                }
                Ok(None) => {
                    tracing::info!(%request_id, "Chat stream completed with {sent} chunks");
                    None
                }
                Err(_) => {
                    tracing::warn!(
                        %request_id,
                        "LLM response idle for {idle_timeout:?} after {sent} chunks"
                    );
                    Some((Err(io::Error::other("upstream generation timed out")), None))
                }
            }
        },
    )
}
