//! Pluggable text-completion backends
//!
//! The classifier treats the model as an opaque service that takes a prompt
//! and returns text with no structural guarantee. This module provides the
//! transport; [`repair`] turns the text into a record.
//!
//! # Architecture
//!
//! - `AIBackend` trait: the interface every backend implements
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! No backend retries. A failed call is reported once and the caller decides
//! what to do with it.

mod mock;
mod ollama;
mod openai_compatible;
pub mod repair;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use repair::{repair, repair_record, ClassificationReply, ParseOutcome, ReplyDefaults};

use async_trait::async_trait;

use crate::config::{AiBackendKind, AiConfig};
use crate::error::{Error, Result};

/// A rendered prompt split at its `# System` / `# User` headings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptParts<'a> {
    pub system: Option<&'a str>,
    pub user: &'a str,
}

/// Split a rendered prompt for backends with a separate system turn
///
/// Without a `# User` heading the whole text is the user turn.
pub fn split_prompt(prompt: &str) -> PromptParts<'_> {
    const USER: &str = "# User";

    let heading = prompt
        .match_indices(USER)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || prompt[..i].ends_with('\n'));
    let Some(at) = heading else {
        return PromptParts {
            system: None,
            user: prompt.trim(),
        };
    };

    let head = prompt[..at].trim();
    let system = head.strip_prefix("# System").unwrap_or(head).trim();
    PromptParts {
        system: (!system.is_empty()).then_some(system),
        user: prompt[at + USER.len()..].trim(),
    }
}

/// Trait defining the interface for all completion backends
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send a text prompt and return the raw reply text
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Send a prompt together with a PNG image (vision models)
    async fn transcribe_image(&self, prompt: &str, image_png: &[u8]) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI and any server implementing `/v1/chat/completions`
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Build a client from configuration
    ///
    /// The public OpenAI endpoint requires an API key; self-hosted
    /// OpenAI-compatible servers usually do not.
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        match config.backend {
            AiBackendKind::OpenAICompatible => {
                if config.api_key.is_none() && config.host.contains("api.openai.com") {
                    return Err(Error::Config(
                        "OPENAI_API_KEY is not set (required for api.openai.com)".into(),
                    ));
                }
                let mut backend = OpenAICompatibleBackend::new(&config.host, &config.model)
                    .with_timeout(config.timeout);
                if let Some(ref key) = config.api_key {
                    backend = backend.with_api_key(key);
                }
                Ok(AIClient::OpenAICompatible(backend))
            }
            AiBackendKind::Ollama => Ok(AIClient::Ollama(
                OllamaBackend::new(&config.host, &config.model).with_timeout(config.timeout),
            )),
            AiBackendKind::Mock => Ok(AIClient::Mock(MockBackend::new())),
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Ollama(b) => AIClient::Ollama(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.clone()),
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(prompt).await,
            AIClient::Ollama(b) => b.complete(prompt).await,
            AIClient::Mock(b) => b.complete(prompt).await,
        }
    }

    async fn transcribe_image(&self, prompt: &str, image_png: &[u8]) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.transcribe_image(prompt, image_png).await,
            AIClient::Ollama(b) => b.transcribe_image(prompt, image_png).await,
            AIClient::Mock(b) => b.transcribe_image(prompt, image_png).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
