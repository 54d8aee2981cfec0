use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat/`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

/// Builds the upstream message list: an optional system prompt followed by
/// the caller's history, verbatim and in order. Roles and contents are not
/// checked here; the upstream rejects what it does not accept.
pub fn build_messages(prompt: Option<&str>, history: &[Message]) -> Vec<Message> {
    let system = prompt.filter(|p| !p.is_empty());
    let mut out = Vec::with_capacity(history.len() + usize::from(system.is_some()));
    if let Some(prompt) = system {
        out.push(Message::new("system", prompt));
    }
    out.extend(history.iter().cloned());
    out
}

#[cfg(test)]
mod tests {
    use super::{ChatRequest, Message, build_messages};
    use serde_json::json;

    #[test]
    fn prompt_is_prepended_as_system_message() {
        let history = vec![Message::new("user", "hi"), Message::new("assistant", "hello")];
        let out = build_messages(Some("be brief"), &history);
        assert_eq!(
            out,
            vec![
                Message::new("system", "be brief"),
                Message::new("user", "hi"),
                Message::new("assistant", "hello"),
            ]
        );
    }

    #[test]
    fn empty_or_absent_prompt_is_omitted() {
        let history = vec![Message::new("user", "hi")];
        assert_eq!(build_messages(Some(""), &history), history);
        assert_eq!(build_messages(None, &history), history);
        assert!(build_messages(None, &[]).is_empty());
    }

    #[test]
    fn history_is_passed_through_unvalidated() {
        let history = vec![
            Message::new("system", "caller system"),
            Message::new("wizard", ""),
            Message::new("user", "third"),
        ];
        let out = build_messages(Some("outer"), &history);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], Message::new("system", "outer"));
        assert_eq!(&out[1..], history.as_slice());
    }

    #[test]
    fn chat_request_applies_defaults() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model_name": "DeepSeek-v3",
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .unwrap();
        assert_eq!(req.max_tokens, 4096);
        assert!((req.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(req.prompt, None);
        assert_eq!(req.messages, vec![Message::new("user", "hi")]);
    }
}
