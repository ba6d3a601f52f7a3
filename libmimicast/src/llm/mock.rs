//! Mock completion provider for testing
//!
//! Responses are scripted in order; once the script runs out the fallback
//! response is returned for every further call.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{GenerationError, Result};
use crate::llm::{Candidate, CompletionProvider, CompletionRequest};

type Scripted = std::result::Result<Vec<Candidate>, GenerationError>;

#[derive(Clone)]
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    fallback: Scripted,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    /// Provider that always answers with a single candidate
    pub fn replying(text: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Ok(vec![Candidate::text(text)]),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Provider that always answers with no candidates
    pub fn empty() -> Self {
        Self {
            fallback: Ok(Vec::new()),
            ..Self::replying("")
        }
    }

    /// Queue a response ahead of the fallback
    pub fn then_reply(self, candidates: Vec<Candidate>) -> Self {
        self.script.lock().unwrap().push_back(Ok(candidates));
        self
    }

    /// Queue a failure ahead of the fallback
    pub fn then_fail(self, error: GenerationError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Vec<Candidate>> {
        self.requests.lock().unwrap().push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        next.map_err(Into::into)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            max_tokens: 16,
            messages: vec![ChatMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let provider = MockProvider::replying("fallback")
            .then_fail(GenerationError::Network("down".to_string()))
            .then_reply(vec![Candidate::text("scripted")]);

        assert!(provider.complete(&request()).await.is_err());
        let second = provider.complete(&request()).await.unwrap();
        assert_eq!(second, vec![Candidate::text("scripted")]);
        let third = provider.complete(&request()).await.unwrap();
        assert_eq!(third, vec![Candidate::text("fallback")]);

        assert_eq!(provider.call_count(), 3);
        assert_eq!(provider.requests()[0].model, "test-model");
    }

    #[tokio::test]
    async fn test_empty_provider() {
        let provider = MockProvider::empty();
        assert!(provider.complete(&request()).await.unwrap().is_empty());
    }
}
