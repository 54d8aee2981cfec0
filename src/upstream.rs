use crate::providers::ProviderConfig;
use crate::request::Message;
use async_trait::async_trait;
use axum::http::StatusCode;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Generation can legitimately run for hours.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(18_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Network,
    Http,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct UpstreamCallError {
    pub kind: UpstreamErrorKind,
    pub status: Option<StatusCode>,
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamCallError {
    pub fn new(kind: UpstreamErrorKind, status: Option<StatusCode>, message: String) -> Self {
        Self {
            kind,
            status,
            code: None,
            message,
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.code = code;
        self
    }
}

/// One undecoded unit of an upstream stream: the `data` payload of a single
/// SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    pub data: String,
}

impl RawChunk {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// A lazily pulled upstream stream.
///
/// `next_chunk` suspends until the next chunk is ready; `None` means the
/// upstream finished. `release` closes the underlying connection. Callers
/// invoke it once on every exit path; implementations tolerate repeats.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Option<Result<RawChunk, UpstreamCallError>>;
    async fn release(&mut self) -> Result<(), UpstreamCallError>;
}

type SseStream = BoxStream<'static, Result<Event, EventStreamError<reqwest::Error>>>;

/// [`ChunkSource`] over an OpenAI-compatible `chat/completions` SSE body.
pub struct SseChunkSource {
    stream: Option<SseStream>,
}

impl SseChunkSource {
    pub fn from_response(resp: reqwest::Response) -> Self {
        Self {
            stream: Some(resp.bytes_stream().eventsource().boxed()),
        }
    }
}

#[async_trait]
impl ChunkSource for SseChunkSource {
    async fn next_chunk(&mut self) -> Option<Result<RawChunk, UpstreamCallError>> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await? {
                Ok(ev) => {
                    let data = ev.data.trim();
                    if data == "[DONE]" {
                        return None;
                    }
                    if data.is_empty() {
                        continue;
                    }
                    return Some(Ok(RawChunk::new(ev.data)));
                }
                Err(err) => {
                    return Some(Err(UpstreamCallError::new(
                        UpstreamErrorKind::Network,
                        None,
                        format!("upstream stream interrupted: {err}"),
                    )));
                }
            }
        }
    }

    async fn release(&mut self) -> Result<(), UpstreamCallError> {
        // Dropping the body stream closes the upstream connection.
        self.stream.take();
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    max_tokens: u32,
    temperature: f64,
}

/// Opens a streaming chat completion against `provider`.
///
/// Returns once the upstream has answered with a success status; the body
/// is consumed lazily through the returned source.
pub async fn open_stream(
    client: &reqwest::Client,
    provider: &ProviderConfig,
    messages: &[Message],
    max_tokens: u32,
    temperature: f64,
    timeout: Duration,
) -> Result<SseChunkSource, UpstreamCallError> {
    let body = CompletionBody {
        model: &provider.upstream_model_id,
        messages,
        stream: true,
        max_tokens,
        temperature,
    };
    let url = join_url(&provider.base_url, "/chat/completions");
    let resp = client
        .post(url)
        .timeout(timeout)
        .bearer_auth(&provider.api_key)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .json(&body)
        .send()
        .await
        .map_err(|err| UpstreamCallError::new(UpstreamErrorKind::Network, None, err.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let code = extract_error_code(&text);
        return Err(UpstreamCallError::new(
            UpstreamErrorKind::Http,
            Some(status),
            format!("upstream status {}: {}", status, text),
        )
        .with_code(code));
    }
    Ok(SseChunkSource::from_response(resp))
}

/// Appends `path` to the configured base URL as given. A base that already
/// ends in the path's leading `/v1` does not get a second one.
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let mut path = path.trim_start_matches('/');
    if base.ends_with("/v1") {
        if let Some(stripped) = path.strip_prefix("v1/") {
            path = stripped;
        }
    }
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

fn extract_error_code(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .get("error")
        .and_then(|v| v.get("code"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::{extract_error_code, join_url};

    #[test]
    fn chat_completions_is_appended_to_base_as_given() {
        assert_eq!(
            join_url("https://api.openai.com/v1", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            join_url("https://ark.cn-beijing.volces.com/api/v3", "/chat/completions"),
            "https://ark.cn-beijing.volces.com/api/v3/chat/completions"
        );
        assert_eq!(
            join_url(
                "https://generativelanguage.googleapis.com/v1beta/openai",
                "/chat/completions"
            ),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
        assert_eq!(
            join_url("https://api.deepseek.com", "/chat/completions"),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[test]
    fn join_url_does_not_double_v1() {
        assert_eq!(
            join_url("http://127.0.0.1:9000/v1", "/v1/models"),
            "http://127.0.0.1:9000/v1/models"
        );
        assert_eq!(
            join_url("http://127.0.0.1:9000", "/v1/models"),
            "http://127.0.0.1:9000/v1/models"
        );
    }

    #[test]
    fn error_code_is_read_from_openai_envelope() {
        assert_eq!(
            extract_error_code(r#"{"error":{"code":"invalid_api_key","message":"nope"}}"#),
            Some("invalid_api_key".to_string())
        );
        assert_eq!(extract_error_code("<html>bad gateway</html>"), None);
    }
}
