//! OpenAI-compatible chat-completions wire shapes (Ollama, vLLM, SGLang, hosted)

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl<'a> ChatRequest<'a> {
    /// Single user turn carrying the image followed by the prompt
    pub fn vision(
        model: &'a str,
        prompt: &'a str,
        image_data_uri: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_uri,
                        },
                    },
                    ContentPart::Text { text: prompt },
                ],
            }],
            max_tokens,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// `{"error": {"message": ...}}` as returned by most compatible servers;
/// some (Ollama) put a bare string under `error`.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl ErrorBody {
    pub fn into_message(self) -> String {
        match self {
            Self::Detailed { message } => message,
            Self::Plain(message) => message,
        }
    }
}
