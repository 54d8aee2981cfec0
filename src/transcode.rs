use crate::upstream::RawChunk;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Normalized wire event. Both fields are always present; an event where
/// both are empty is never produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub content: String,
    pub reasoning_content: String,
}

impl StreamEvent {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning_content.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeState {
    Streaming,
    Done,
    Cancelled,
    Failed,
}

impl TranscodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeState::Streaming => "streaming",
            TranscodeState::Done => "completed",
            TranscodeState::Cancelled => "cancelled",
            TranscodeState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscodeError {
    #[error("chunk is not valid json: {0}")]
    InvalidJson(String),
    #[error("chunk is not a json object")]
    NotAnObject,
    #[error("delta field `{0}` is neither a string nor null")]
    InvalidDelta(&'static str),
    #[error("upstream reported an error mid-stream: {0}")]
    UpstreamReported(String),
}

/// Decodes one `chat.completion.chunk` into a [`StreamEvent`].
///
/// Returns `Ok(None)` for chunks that carry neither content nor reasoning
/// (role-only openers, finish markers, trailing usage chunks).
pub fn transcode_chunk(chunk: &RawChunk) -> Result<Option<StreamEvent>, TranscodeError> {
    let value: Value =
        serde_json::from_str(&chunk.data).map_err(|err| TranscodeError::InvalidJson(err.to_string()))?;
    let obj = value.as_object().ok_or(TranscodeError::NotAnObject)?;
    if let Some(err) = obj.get("error").filter(|v| !v.is_null()) {
        return Err(TranscodeError::UpstreamReported(error_message(err)));
    }

    let Some(delta) = first_delta(obj) else {
        return Ok(None);
    };
    let event = StreamEvent {
        content: delta_text(delta, "content")?,
        reasoning_content: delta_text(delta, "reasoning_content")?,
    };
    if event.is_empty() {
        return Ok(None);
    }
    Ok(Some(event))
}

fn first_delta(obj: &Map<String, Value>) -> Option<&Map<String, Value>> {
    obj.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.as_object())
}

fn delta_text(delta: &Map<String, Value>, field: &'static str) -> Result<String, TranscodeError> {
    match delta.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(TranscodeError::InvalidDelta(field)),
    }
}

fn error_message(err: &Value) -> String {
    err.get("message")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{StreamEvent, TranscodeError, transcode_chunk};
    use crate::upstream::RawChunk;
    use serde_json::{Value, json};

    fn chunk(delta: Value) -> RawChunk {
        RawChunk::new(
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "choices": [{ "index": 0, "delta": delta, "finish_reason": Value::Null }]
            })
            .to_string(),
        )
    }

    #[test]
    fn content_only_chunk_fills_reasoning_with_empty_string() {
        let ev = transcode_chunk(&chunk(json!({ "content": "Hel" })))
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            StreamEvent {
                content: "Hel".to_string(),
                reasoning_content: String::new(),
            }
        );
        assert_eq!(
            serde_json::to_string(&ev).unwrap(),
            r#"{"content":"Hel","reasoning_content":""}"#
        );
    }

    #[test]
    fn reasoning_only_chunk_fills_content_with_empty_string() {
        let ev = transcode_chunk(&chunk(json!({ "reasoning_content": "thinking", "content": null })))
            .unwrap()
            .unwrap();
        assert_eq!(ev.content, "");
        assert_eq!(ev.reasoning_content, "thinking");
    }

    #[test]
    fn both_deltas_are_kept_in_one_event() {
        let ev = transcode_chunk(&chunk(json!({ "reasoning_content": "r", "content": "c" })))
            .unwrap()
            .unwrap();
        assert_eq!(ev.content, "c");
        assert_eq!(ev.reasoning_content, "r");
    }

    #[test]
    fn empty_chunks_are_suppressed() {
        for delta in [
            json!({}),
            json!({ "role": "assistant", "content": "" }),
            json!({ "content": null, "reasoning_content": null }),
            json!({ "content": "", "reasoning_content": "" }),
        ] {
            assert_eq!(transcode_chunk(&chunk(delta)).unwrap(), None);
        }
        let usage_only = RawChunk::new(
            json!({ "choices": [], "usage": { "prompt_tokens": 3, "completion_tokens": 2 } })
                .to_string(),
        );
        assert_eq!(transcode_chunk(&usage_only).unwrap(), None);
        assert_eq!(transcode_chunk(&RawChunk::new("{}")).unwrap(), None);
    }

    #[test]
    fn malformed_chunks_fail() {
        assert!(matches!(
            transcode_chunk(&RawChunk::new("not json")),
            Err(TranscodeError::InvalidJson(_))
        ));
        assert_eq!(
            transcode_chunk(&RawChunk::new("[1,2]")),
            Err(TranscodeError::NotAnObject)
        );
        assert_eq!(
            transcode_chunk(&chunk(json!({ "content": 42 }))),
            Err(TranscodeError::InvalidDelta("content"))
        );
    }

    #[test]
    fn inline_upstream_error_fails_the_chunk() {
        let raw = RawChunk::new(
            json!({ "error": { "message": "context length exceeded", "code": "bad" } }).to_string(),
        );
        assert_eq!(
            transcode_chunk(&raw),
            Err(TranscodeError::UpstreamReported(
                "context length exceeded".to_string()
            ))
        );
    }

    #[test]
    fn concatenation_matches_input_deltas() {
        let deltas = [
            (Some("The "), None),
            (None, Some("hmm ")),
            (Some(""), Some("")),
            (Some("answer "), Some("ok")),
            (None, None),
            (Some("is 42"), None),
        ];
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut emitted = 0;
        for (c, r) in deltas {
            let mut delta = serde_json::Map::new();
            if let Some(c) = c {
                delta.insert("content".into(), json!(c));
            }
            if let Some(r) = r {
                delta.insert("reasoning_content".into(), json!(r));
            }
            if let Some(ev) = transcode_chunk(&chunk(Value::Object(delta))).unwrap() {
                assert!(!ev.is_empty());
                content.push_str(&ev.content);
                reasoning.push_str(&ev.reasoning_content);
                emitted += 1;
            }
        }
        assert_eq!(emitted, 4);
        assert_eq!(content, "The answer is 42");
        assert_eq!(reasoning, "hmm ok");
    }
}
