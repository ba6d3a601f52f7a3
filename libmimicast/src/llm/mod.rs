//! Completion provider abstraction
//!
//! The orchestrator only needs a narrow request/response capability: send an
//! ordered list of role-tagged messages, get back zero or more candidate
//! completions. [`openai::OpenAiCompatProvider`] serves any OpenAI-compatible
//! endpoint (DeepSeek, ChatGPT); [`mock::MockProvider`] scripts responses for
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod mock;
pub mod openai;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

/// One candidate completion; text may be absent
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    pub text: Option<String>,
}

impl Candidate {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion request
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` variants for network failures, rejected keys,
    /// rate limits and malformed responses.
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<Candidate>>;

    /// Provider identifier used in logs
    fn name(&self) -> &str;
}
