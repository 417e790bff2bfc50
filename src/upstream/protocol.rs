// Keypool — Chat Completion Wire Types
//
// The provider speaks the OpenAI-style chat-completions format. We only need
// the request body and the handful of reply fields that carry the model's
// text, so these are modelled directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Request body: `{model, messages, temperature, max_tokens}`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// A single-message request carrying the prompt as the system message.
    pub fn new(prompt: &str, model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(prompt)],
            temperature,
            max_tokens,
        }
    }

    /// Same payload aimed at a different model.
    pub fn for_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the structured response out of a successful completion body.
///
/// The model's text (`choices[0].message.content`) must itself be a JSON
/// object. Anything else, including a well-formed list or scalar, is an error.
pub fn extract_structured(body: &str) -> Result<Map<String, Value>, String> {
    let completion: ChatCompletion =
        serde_json::from_str(body).map_err(|e| format!("Invalid completion body: {}", e))?;

    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| "Completion has no message content".to_string())?;

    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!(
            "Structured response is not an object (got {})",
            value_kind(&other)
        )),
        Err(e) => Err(format!("Content is not valid JSON: {}", e)),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
