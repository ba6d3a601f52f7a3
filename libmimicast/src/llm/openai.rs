//! OpenAI-compatible chat completions provider
//!
//! Sends requests to `{base_url}/chat/completions` with a bearer key. DeepSeek
//! and ChatGPT share this wire format, so a [`ProviderService`] preset only
//! picks the default base URL and model.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and only exposed when
//! building the request header.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{GenerationError, Result};
use crate::llm::{Candidate, ChatMessage, CompletionProvider, CompletionRequest};

/// Known OpenAI-compatible services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderService {
    #[serde(alias = "DEEPSEEK")]
    DeepSeek,
    #[serde(alias = "CHATGPT", alias = "openai")]
    ChatGpt,
}

impl ProviderService {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderService::DeepSeek => "https://api.deepseek.com/v1",
            ProviderService::ChatGpt => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderService::DeepSeek => "deepseek-chat",
            ProviderService::ChatGpt => "gpt-4o-mini",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderService::DeepSeek => "deepseek",
            ProviderService::ChatGpt => "chatgpt",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a chat completions response body into candidates
fn parse_candidates(body: &str) -> Result<Vec<Candidate>> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Parse(format!("failed to parse response: {}", e)))?;

    Ok(response
        .choices
        .into_iter()
        .map(|choice| Candidate {
            text: choice.message.and_then(|m| m.content),
        })
        .collect())
}

/// Provider for any OpenAI-compatible chat completions API
///
/// Does not derive Debug so the key inside can never be formatted.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    name: String,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: SecretString, base_url: &str, name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| GenerationError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            name: name.to_string(),
        })
    }

    /// Provider for a known service at its default endpoint
    pub fn for_service(service: ProviderService, api_key: SecretString) -> Result<Self> {
        Self::new(api_key, service.default_base_url(), service.name())
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<Candidate>> {
        let body = ChatCompletionBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: &request.messages,
        };

        tracing::debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Requesting completion"
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            let text: String = text.chars().take(500).collect();
            return Err(match status.as_u16() {
                401 | 403 => GenerationError::Authentication(format!("HTTP {}: {}", status, text)),
                429 => GenerationError::RateLimit(format!("HTTP {}: {}", status, text)),
                _ => GenerationError::Provider(format!("HTTP {}: {}", status, text)),
            }
            .into());
        }

        parse_candidates(&text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MimicastError;

    #[test]
    fn test_service_defaults() {
        assert_eq!(
            ProviderService::DeepSeek.default_base_url(),
            "https://api.deepseek.com/v1"
        );
        assert_eq!(ProviderService::ChatGpt.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_service_parses_legacy_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            service: ProviderService,
        }

        let parsed: Wrapper = toml::from_str("service = \"DEEPSEEK\"").unwrap();
        assert_eq!(parsed.service, ProviderService::DeepSeek);
        let parsed: Wrapper = toml::from_str("service = \"chatgpt\"").unwrap();
        assert_eq!(parsed.service, ProviderService::ChatGpt);
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::user("write something")];
        let body = ChatCompletionBody {
            model: "deepseek-chat",
            max_tokens: 4096,
            messages: &messages,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "write something");
    }

    #[test]
    fn test_parse_candidates() {
        let body = r#"{
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "first"}},
                {"index": 1, "message": {"role": "assistant", "content": null}}
            ]
        }"#;

        let candidates = parse_candidates(body).unwrap();
        assert_eq!(candidates, vec![Candidate::text("first"), Candidate { text: None }]);
    }

    #[test]
    fn test_parse_no_choices() {
        assert!(parse_candidates(r#"{"choices": []}"#).unwrap().is_empty());
        assert!(parse_candidates(r#"{"id": "x"}"#).unwrap().is_empty());
    }

    #[test]
    fn test_parse_garbage() {
        let result = parse_candidates("<html>bad gateway</html>");
        assert!(matches!(
            result,
            Err(MimicastError::Generation(GenerationError::Parse(_)))
        ));
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        let provider =
            OpenAiCompatProvider::new(SecretString::from("sk"), "https://llm.local/v1/", "local")
                .unwrap();
        assert_eq!(provider.url(), "https://llm.local/v1/chat/completions");
        assert_eq!(provider.name(), "local");
    }
}
