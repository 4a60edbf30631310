use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::{Part, Turn};

/// Lazy, non-restartable sequence of generated text chunks. Dropping it
/// closes the upstream connection.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Anything that can stream a completion for a conversation.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Open a streaming completion. `prior_turns` is the history before the
    /// latest user message, which is passed separately as `latest_query`.
    async fn stream_complete(
        &self,
        prior_turns: &[Turn],
        system_instruction: &str,
        latest_query: &str,
    ) -> Result<ChatStream>;
}

/// Streams completions from Gemini, an OpenAI-compatible server, or Ollama.
pub struct HttpCompletionGateway {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpCompletionGateway {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CompletionGateway for HttpCompletionGateway {
    async fn stream_complete(
        &self,
        prior_turns: &[Turn],
        system_instruction: &str,
        latest_query: &str,
    ) -> Result<ChatStream> {
        match self.config.provider.as_str() {
            "gemini" => {
                stream_gemini(
                    &self.client,
                    &self.config,
                    prior_turns,
                    system_instruction,
                    latest_query,
                )
                .await
            }
            "openai" => {
                let messages = build_role_messages(prior_turns, system_instruction, latest_query);
                stream_openai(&self.client, &self.config, messages).await
            }
            "ollama" => {
                let messages = build_role_messages(prior_turns, system_instruction, latest_query);
                stream_ollama(&self.client, &self.config, messages).await
            }
            other => anyhow::bail!("Unsupported LLM provider for chat: {other}"),
        }
    }
}

/// Send a streaming request and fail on a non-success status.
async fn send_streaming(req: reqwest::RequestBuilder, provider: &str) -> Result<reqwest::Response> {
    let resp = req
        .send()
        .await
        .with_context(|| format!("Failed to connect to {provider} for chat streaming"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{provider} chat API returned {status}: {body}");
    }
    Ok(resp)
}

/// Turn a response body into a chunk stream using a per-provider line parser.
fn chunk_stream(resp: reqwest::Response, parse: fn(&str) -> Option<Result<String>>) -> ChatStream {
    let stream = stream_lines(resp.bytes_stream()).filter_map(move |line_result| async move {
        match line_result {
            Ok(line) => parse(&line),
            Err(e) => Some(Err(e)),
        }
    });
    Box::pin(stream)
}

// ─── Gemini streaming ────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    error: Option<GeminiError>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: String,
}

fn gemini_content(role: &str, parts: &[Part]) -> GeminiContent {
    GeminiContent {
        role: Some(role.to_string()),
        parts: parts
            .iter()
            .map(|p| GeminiPart {
                text: p.text.clone(),
            })
            .collect(),
    }
}

fn build_gemini_request(
    config: &LlmConfig,
    prior_turns: &[Turn],
    system_instruction: &str,
    latest_query: &str,
) -> GeminiStreamRequest {
    let mut contents: Vec<GeminiContent> = prior_turns
        .iter()
        .map(|t| gemini_content(&t.role, &t.parts))
        .collect();
    contents.push(gemini_content(
        "user",
        &[Part {
            text: latest_query.to_string(),
        }],
    ));

    GeminiStreamRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: system_instruction.to_string(),
            }],
        },
        contents,
        generation_config: GeminiGenerationConfig {
            max_output_tokens: config.max_output_tokens,
        },
    }
}

async fn stream_gemini(
    client: &reqwest::Client,
    config: &LlmConfig,
    prior_turns: &[Turn],
    system_instruction: &str,
    latest_query: &str,
) -> Result<ChatStream> {
    let url = format!(
        "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
        config.base_url, config.chat_model
    );
    let req = build_gemini_request(config, prior_turns, system_instruction, latest_query);

    let mut builder = client
        .post(&url)
        .timeout(Duration::from_secs(config.timeout_secs))
        .json(&req);
    if let Some(key) = config.api_key.as_deref() {
        builder = builder.header("x-goog-api-key", key);
    }

    let resp = send_streaming(builder, "Gemini").await?;
    Ok(chunk_stream(resp, parse_gemini_line))
}

/// Parse a single Gemini SSE line into a text delta. In-band API errors and
/// malformed JSON become error items.
fn parse_gemini_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;

    let chunk = match serde_json::from_str::<GeminiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(anyhow::anyhow!("Malformed Gemini stream line: {e}"))),
    };
    if let Some(err) = chunk.error {
        return Some(Err(anyhow::anyhow!("Gemini stream error: {}", err.message)));
    }
    let content: String = chunk
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
        .unwrap_or_default();
    non_empty(content)
}

// ─── Role/content message APIs ───────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

/// Flatten history into system + role/content messages. Gemini's "model"
/// role is called "assistant" by the other providers.
fn build_role_messages(
    prior_turns: &[Turn],
    system_instruction: &str,
    latest_query: &str,
) -> Vec<StreamMessage> {
    let mut messages = Vec::with_capacity(prior_turns.len() + 2);
    messages.push(StreamMessage {
        role: "system".to_string(),
        content: system_instruction.to_string(),
    });
    messages.extend(prior_turns.iter().map(|t| StreamMessage {
        role: match t.role.as_str() {
            "model" => "assistant".to_string(),
            other => other.to_string(),
        },
        content: t.joined_text(),
    }));
    messages.push(StreamMessage {
        role: "user".to_string(),
        content: latest_query.to_string(),
    });
    messages
}

// ─── Ollama streaming ────────────────────────────────────

#[derive(Serialize)]
struct OllamaStreamRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// One NDJSON line. The final line has `done: true` and may carry no message;
/// failures arrive in-band as `{"error": "..."}`.
#[derive(Deserialize)]
struct OllamaStreamChunk {
    message: Option<StreamMessage>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

fn build_ollama_request(config: &LlmConfig, messages: Vec<StreamMessage>) -> OllamaStreamRequest {
    OllamaStreamRequest {
        model: config.chat_model.clone(),
        messages,
        stream: true,
        options: OllamaOptions {
            num_predict: config.max_output_tokens,
        },
    }
}

async fn stream_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: Vec<StreamMessage>,
) -> Result<ChatStream> {
    let url = format!("{}/api/chat", config.base_url);
    let req = build_ollama_request(config, messages);

    let builder = client
        .post(&url)
        .timeout(Duration::from_secs(config.timeout_secs))
        .json(&req);

    let resp = send_streaming(builder, "Ollama").await?;
    Ok(chunk_stream(resp, parse_ollama_line))
}

fn parse_ollama_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let chunk = match serde_json::from_str::<OllamaStreamChunk>(line) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(anyhow::anyhow!("Malformed Ollama stream line: {e}"))),
    };
    if let Some(err) = chunk.error {
        return Some(Err(anyhow::anyhow!("Ollama stream error: {err}")));
    }
    if chunk.done {
        return None;
    }
    non_empty(chunk.message.map(|m| m.content).unwrap_or_default())
}

// ─── OpenAI streaming ────────────────────────────────────

#[derive(Serialize)]
struct OpenAiStreamRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiError>,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiStreamDelta,
}

#[derive(Deserialize, Default)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiError {
    #[serde(default)]
    message: String,
}

fn build_openai_request(config: &LlmConfig, messages: Vec<StreamMessage>) -> OpenAiStreamRequest {
    OpenAiStreamRequest {
        model: config.chat_model.clone(),
        messages,
        stream: true,
        max_tokens: config.max_output_tokens,
    }
}

async fn stream_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: Vec<StreamMessage>,
) -> Result<ChatStream> {
    let url = format!("{}/v1/chat/completions", config.base_url);
    let req = build_openai_request(config, messages);

    let mut builder = client
        .post(&url)
        .timeout(Duration::from_secs(config.timeout_secs))
        .json(&req);
    if let Some(key) = config.api_key.as_deref() {
        builder = builder.bearer_auth(key);
    }

    let resp = send_streaming(builder, "OpenAI").await?;
    Ok(chunk_stream(resp, parse_openai_line))
}

fn parse_openai_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;

    let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(Err(anyhow::anyhow!("Malformed OpenAI stream line: {e}"))),
    };
    if let Some(err) = chunk.error {
        return Some(Err(anyhow::anyhow!("OpenAI stream error: {}", err.message)));
    }
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .unwrap_or_default();
    non_empty(content)
}

// ─── Shared line helpers ─────────────────────────────────

/// Payload of an SSE `data:` line. Other SSE fields, blank keep-alives and the
/// `[DONE]` sentinel yield `None`.
fn sse_data(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?.trim();
    (!data.is_empty() && data != "[DONE]").then_some(data)
}

/// Empty deltas (role-only chunks, finish markers) are skipped.
fn non_empty(content: String) -> Option<Result<String>> {
    (!content.is_empty()).then(|| Ok(content))
}

// ─── Line buffering ──────────────────────────────────────

/// Convert a byte stream into a stream of complete lines.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// network chunks are decoded whole.
fn stream_lines<E>(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send
where
    E: Display + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(byte_stream), Vec::<u8>::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                    let rest = buffer.split_off(newline_pos + 1);
                    let line = String::from_utf8_lossy(&buffer[..newline_pos]).into_owned();
                    buffer = rest;
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("Stream read error: {e}")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        // Stream ended: emit remaining buffer if non-empty
                        if buffer.iter().any(|b| !b.is_ascii_whitespace()) {
                            let remaining = String::from_utf8_lossy(&std::mem::take(&mut buffer))
                                .into_owned();
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Gemini parsing ──────────────────────────────────

    #[test]
    fn test_parse_gemini_data_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"你好"}],"role":"model"}}]}"#;
        assert_eq!(parse_gemini_line(line).unwrap().unwrap(), "你好");
    }

    #[test]
    fn test_parse_gemini_joins_parts() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(parse_gemini_line(line).unwrap().unwrap(), "ab");
    }

    #[test]
    fn test_parse_gemini_finish_chunk_without_content() {
        let line = r#"data: {"candidates":[{"finishReason":"STOP"}],"usageMetadata":{}}"#;
        assert!(parse_gemini_line(line).is_none());
    }

    #[test]
    fn test_parse_gemini_in_band_error() {
        let line = r#"data: {"error":{"code":429,"message":"quota exceeded"}}"#;
        let err = parse_gemini_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_parse_gemini_malformed() {
        assert!(parse_gemini_line("data: {oops").unwrap().is_err());
    }

    #[test]
    fn test_parse_gemini_non_data_line() {
        assert!(parse_gemini_line("event: message").is_none());
        assert!(parse_gemini_line("data:").is_none());
    }

    #[test]
    fn test_gemini_request_shape() {
        let config = LlmConfig {
            max_output_tokens: 256,
            ..LlmConfig::default()
        };
        let prior = vec![
            Turn::user("早"),
            Turn {
                role: "model".into(),
                parts: vec![Part { text: "早啊".into() }],
            },
        ];
        let req = build_gemini_request(&config, &prior, "SYS", "今天怎么样");
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "SYS");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "早啊");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "今天怎么样");
    }

    // ─── Role/content messages ───────────────────────────

    #[test]
    fn test_role_messages_map_model_to_assistant() {
        let prior = vec![
            Turn::user("q1"),
            Turn {
                role: "model".into(),
                parts: vec![Part { text: "a1".into() }],
            },
        ];
        let msgs = build_role_messages(&prior, "sys", "q2");
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(msgs[0].content, "sys");
        assert_eq!(msgs[3].content, "q2");
    }

    #[test]
    fn test_role_messages_no_history() {
        let msgs = build_role_messages(&[], "sys", "hello");
        assert_eq!(msgs.len(), 2);
    }

    // ─── Ollama ──────────────────────────────────────────

    #[test]
    fn test_ollama_request_carries_num_predict() {
        let config = LlmConfig {
            chat_model: "qwen2.5".into(),
            max_output_tokens: 77,
            ..LlmConfig::default()
        };
        let req = build_ollama_request(&config, build_role_messages(&[], "sys", "q"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "qwen2.5");
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 77);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_parse_ollama_delta() {
        let line = r#"{"message":{"role":"assistant","content":"开心"},"done":false}"#;
        assert_eq!(parse_ollama_line(line).unwrap().unwrap(), "开心");
    }

    #[test]
    fn test_parse_ollama_final_line_without_message() {
        let line = r#"{"done":true,"total_duration":123}"#;
        assert!(parse_ollama_line(line).is_none());
    }

    #[test]
    fn test_parse_ollama_in_band_error() {
        let line = r#"{"error":"model 'qwen' not found"}"#;
        let err = parse_ollama_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_parse_ollama_malformed() {
        assert!(parse_ollama_line("{\"message\":").unwrap().is_err());
    }

    // ─── OpenAI ──────────────────────────────────────────

    #[test]
    fn test_openai_request_carries_max_tokens() {
        let config = LlmConfig {
            chat_model: "gpt-4o-mini".into(),
            max_output_tokens: 300,
            ..LlmConfig::default()
        };
        let req = build_openai_request(&config, build_role_messages(&[], "sys", "q"));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 300);
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_openai_delta_with_or_without_space() {
        let spaced = r#"data: {"choices":[{"delta":{"content":"你"}}]}"#;
        let tight = r#"data:{"choices":[{"delta":{"content":"好"}}]}"#;
        assert_eq!(parse_openai_line(spaced).unwrap().unwrap(), "你");
        assert_eq!(parse_openai_line(tight).unwrap().unwrap(), "好");
    }

    #[test]
    fn test_parse_openai_skips_role_only_and_finish_chunks() {
        let role = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        let finish = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let usage = r#"data: {"choices":[],"usage":{"total_tokens":9}}"#;
        assert!(parse_openai_line(role).is_none());
        assert!(parse_openai_line(finish).is_none());
        assert!(parse_openai_line(usage).is_none());
    }

    #[test]
    fn test_parse_openai_in_band_error() {
        let line = r#"data: {"error":{"message":"rate limited","type":"requests"}}"#;
        let err = parse_openai_line(line).unwrap().unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    // ─── SSE helpers ─────────────────────────────────────

    #[test]
    fn test_sse_data_filters_non_payload_lines() {
        assert_eq!(sse_data("data: {}\r"), Some("{}"));
        assert_eq!(sse_data("data: [DONE]"), None);
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: message"), None);
        assert_eq!(sse_data("   "), None);
    }

    // ─── Line buffering ──────────────────────────────────

    fn byte_chunks(chunks: Vec<&'static [u8]>) -> Vec<std::io::Result<Bytes>> {
        chunks.into_iter().map(|c| Ok(Bytes::from_static(c))).collect()
    }

    #[tokio::test]
    async fn test_stream_lines_reassembles_split_utf8() {
        let text = "你好\n世界\n".as_bytes();
        // Split inside the three-byte encoding of '你' and of '世'.
        let input = byte_chunks(vec![&text[..1], &text[1..8], &text[8..]]);
        let lines: Vec<String> = stream_lines(futures_util::stream::iter(input))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["你好", "世界"]);
    }

    #[tokio::test]
    async fn test_stream_lines_skips_blank_and_flushes_tail() {
        let input = byte_chunks(vec![b"a\n\n\r\n", b"b"]);
        let lines: Vec<String> = stream_lines(futures_util::stream::iter(input))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stream_lines_surfaces_read_errors() {
        let input: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"a\n")),
            Err(std::io::Error::other("reset")),
        ];
        let items: Vec<Result<String>> =
            stream_lines(futures_util::stream::iter(input)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].as_ref().unwrap_err().to_string().contains("reset"));
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_before_io() {
        let gateway = HttpCompletionGateway::new(
            reqwest::Client::new(),
            LlmConfig {
                provider: "bard".into(),
                ..LlmConfig::default()
            },
        );
        let err = match gateway.stream_complete(&[], "sys", "q").await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("Unsupported LLM provider"));
    }

    // ─── Against a local server ──────────────────────────

    const GEMINI_SSE_BODY: &str = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"你\"}],\"role\":\"model\"}}]}\r\n\r\n\
data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"好\"}],\"role\":\"model\"}}]}\r\n\r\n\
data: {\"candidates\":[{\"finishReason\":\"STOP\"}]}\r\n\r\n";

    /// Stand-in for the Gemini endpoint: checks URL, key and body, then
    /// streams two deltas. Mismatches answer 400 with a reason.
    async fn gemini_stub(
        axum::extract::Path(target): axum::extract::Path<String>,
        uri: axum::http::Uri,
        headers: axum::http::HeaderMap,
        axum::Json(body): axum::Json<serde_json::Value>,
    ) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("good-key") {
            return (StatusCode::UNAUTHORIZED, "API key not valid").into_response();
        }
        if target != "gemini-test:streamGenerateContent" || uri.query() != Some("alt=sse") {
            return (StatusCode::BAD_REQUEST, format!("unexpected target {uri}")).into_response();
        }
        if body["systemInstruction"]["parts"][0]["text"] != "SYS"
            || body["contents"][1]["parts"][0]["text"] != "你好"
        {
            return (StatusCode::BAD_REQUEST, format!("unexpected body {body}")).into_response();
        }
        (
            [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
            GEMINI_SSE_BODY,
        )
            .into_response()
    }

    async fn spawn_gemini_stub() -> String {
        let app = axum::Router::new().route(
            "/v1beta/models/{target}",
            axum::routing::post(gemini_stub),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn local_gemini(base_url: String, api_key: &str) -> HttpCompletionGateway {
        HttpCompletionGateway::new(
            reqwest::Client::new(),
            LlmConfig {
                provider: "gemini".into(),
                base_url,
                chat_model: "gemini-test".into(),
                api_key: Some(api_key.into()),
                ..LlmConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_gemini_streams_chunks_from_server() {
        let gateway = local_gemini(spawn_gemini_stub().await, "good-key");

        let stream = match gateway.stream_complete(&[Turn::user("早")], "SYS", "你好").await {
            Ok(stream) => stream,
            Err(e) => panic!("stream failed to open: {e:#}"),
        };
        let chunks: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(chunks, vec!["你", "好"]);
    }

    #[tokio::test]
    async fn test_gemini_non_success_status_is_error() {
        let gateway = local_gemini(spawn_gemini_stub().await, "bad-key");

        let err = match gateway.stream_complete(&[], "SYS", "你好").await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("401"), "got: {err}");
        assert!(err.contains("API key not valid"), "got: {err}");
    }
}
