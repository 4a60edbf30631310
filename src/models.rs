use serde::{Deserialize, Serialize};

/// One message of a conversation, in the shape the chat front-end sends:
/// `{ "role": "user", "parts": [{ "text": "..." }] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default = "default_role")]
    pub role: String,
    pub parts: Vec<Part>,
}

/// A text fragment of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: default_role(),
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Text of the first part, which is what the chat front-end puts the message in.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.first().map(|p| p.text.as_str())
    }

    /// All parts joined, for providers that take a single content string per message.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub corpus_lines: usize,
}
