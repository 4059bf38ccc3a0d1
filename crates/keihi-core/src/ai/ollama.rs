//! Ollama backend
//!
//! Uses `/api/generate` with streaming off. The `# System` part of a prompt
//! is sent in the request's `system` field; images travel base64-encoded in
//! `images` for vision models.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{split_prompt, AIBackend};

#[derive(Clone)]
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    model: String,
    timeout: Option<Duration>,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: None,
        }
    }

    /// Per-request timeout; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    async fn generate(&self, prompt: &str, images: Vec<String>) -> Result<String> {
        let parts = split_prompt(prompt);
        let body = GenerateRequest {
            model: &self.model,
            system: parts.system,
            prompt: parts.user,
            images,
            stream: false,
        };

        let mut builder = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "Ollama API error {}: {}",
                status, text
            )));
        }

        let reply: GenerateResponse = response.json().await?;
        debug!(model = %self.model, chars = reply.response.chars().count(), "Ollama reply received");
        Ok(reply.response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, Vec::new()).await
    }

    async fn transcribe_image(&self, prompt: &str, image_png: &[u8]) -> Result<String> {
        let image = base64::engine::general_purpose::STANDARD.encode(image_png);
        self.generate(prompt, vec![image]).await
    }

    async fn health_check(&self) -> bool {
        let request = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5));
        matches!(request.send().await, Ok(r) if r.status().is_success())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
