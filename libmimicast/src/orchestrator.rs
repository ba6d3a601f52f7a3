//! Prompt assembly and post generation
//!
//! [`render_prompt`] lays a [`GenerationRequest`] out as one instruction block.
//! [`ContentOrchestrator`] sends it to the completion provider and sanitizes the
//! first candidate.

use std::sync::Arc;

use crate::accounts::Corpus;
use crate::error::Result;
use crate::llm::{ChatMessage, CompletionProvider, CompletionRequest};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const RULES: &str = "\
Rules
1. Mirror the voice of the reference accounts: their slang, humor, capitalization and rhythm.
2. Treat the blocklist as off limits. Do not reuse its opening words, its distinctive phrases or its themes.
3. Vary the length of what you write from one post to the next.
4. Do not use emojis, quotation marks or markdown.";

const OUTPUT_FORMAT: &str = "\
Output
Reply with the text of a single post and nothing else. No markdown, no quotation marks, no links, no commentary before or after it.";

/// Everything the prompt is built from for one cycle
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub directive: String,
    /// The agent's own recent posts, used as a blocklist
    pub own: Corpus,
    pub style_sources: Vec<Corpus>,
    pub content_sources: Vec<Corpus>,
}

fn push_section(prompt: &mut String, title: &str, body: &str) {
    prompt.push_str("====\n");
    prompt.push_str(title);
    prompt.push_str("\n----\n");
    prompt.push_str(body);
    prompt.push_str("\n====\n\n");
}

/// Build the prompt text for a request
pub fn render_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("====\n");
    prompt.push_str(RULES);
    prompt.push_str("\n====\n\n");

    push_section(&mut prompt, "Directive", request.directive.trim());

    for corpus in &request.style_sources {
        push_section(
            &mut prompt,
            &format!("Voice of @{} (copy tone, structure and jokes)", corpus.handle),
            &corpus.posts.join("\n"),
        );
    }

    for corpus in &request.content_sources {
        push_section(
            &mut prompt,
            &format!("Material from @{} (draw topics from these)", corpus.handle),
            &corpus.posts.join("\n"),
        );
    }

    push_section(
        &mut prompt,
        &format!("Blocklist: earlier posts by @{} (do not repeat)", request.own.handle),
        &request.own.posts.join("\n"),
    );

    prompt.push_str("====\n");
    prompt.push_str(OUTPUT_FORMAT);
    prompt.push_str("\n====\n");

    prompt
}

/// Remove every double quote character
pub fn strip_quotes(text: &str) -> String {
    text.replace('"', "")
}

pub struct ContentOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    max_tokens: u32,
}

impl ContentOrchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Generate one post, or `None` when the provider offers no usable text
    ///
    /// Text that is empty or blank once quotes are removed counts as no text.
    ///
    /// # Errors
    ///
    /// Provider failures are returned as `MimicastError::Generation`.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Option<String>> {
        let completion = CompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage::user(render_prompt(request))],
        };

        let candidates = self.provider.complete(&completion).await?;
        tracing::debug!(
            provider = self.provider.name(),
            candidates = candidates.len(),
            "Received completion"
        );

        Ok(candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.text)
            .map(|text| strip_quotes(&text))
            .filter(|text| !text.trim().is_empty()))
    }
}
