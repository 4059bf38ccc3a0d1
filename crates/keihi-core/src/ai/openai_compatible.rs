//! OpenAI-compatible backend
//!
//! Talks to `/v1/chat/completions`, so it works with the public OpenAI API
//! as well as self-hosted servers (vLLM, LocalAI, llama-server). The
//! `# System` part of a prompt goes out as the system message.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::{split_prompt, AIBackend};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl OpenAICompatibleBackend {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            timeout: None,
        }
    }

    /// Bearer token for every request
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
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

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn chat(&self, messages: Vec<Message<'_>>, temperature: f32) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            stream: false,
        };

        let mut builder = self.authorized(
            self.http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .json(&body),
        );
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::InvalidData(format!(
                "OpenAI API error {}: {}",
                status, text
            )));
        }

        let reply: ChatResponse = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or_else(|| Error::InvalidData("OpenAI API returned no message content".into()))?;
        debug!(model = %self.model, chars = content.chars().count(), "Chat completion received");
        Ok(content)
    }
}

/// System message (if any) followed by the user turn
fn messages<'a>(prompt: &'a str, image: Option<String>) -> Vec<Message<'a>> {
    let parts = split_prompt(prompt);
    let mut out = Vec::with_capacity(2);
    if let Some(system) = parts.system {
        out.push(Message {
            role: "system",
            content: Content::Text(system),
        });
    }
    let content = match image {
        None => Content::Text(parts.user),
        Some(data_url) => Content::Parts(vec![
            Part::Text { text: parts.user },
            Part::ImageUrl {
                image_url: ImageUrl { url: data_url },
            },
        ]),
    };
    out.push(Message {
        role: "user",
        content,
    });
    out
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Content<'a> {
    Text(&'a str),
    Parts(Vec<Part<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.chat(messages(prompt, None), 0.1).await
    }

    async fn transcribe_image(&self, prompt: &str, image_png: &[u8]) -> Result<String> {
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image_png)
        );
        self.chat(messages(prompt, Some(data_url)), 0.0).await
    }

    async fn health_check(&self) -> bool {
        let request = self
            .authorized(self.http.get(format!("{}/v1/models", self.base_url)))
            .timeout(HEALTH_TIMEOUT);
        matches!(request.send().await, Ok(r) if r.status().is_success())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockCompletionServer;

    #[test]
    fn test_messages_split_system_and_user() {
        let msgs = messages("# System\nclassify\n# User\n項目: バス", None);
        let json = serde_json::to_value(&msgs).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "classify");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[1]["content"], "項目: バス");
    }

    #[test]
    fn test_vision_message_parts() {
        let msgs = messages("read", Some("data:image/png;base64,AA==".into()));
        let json = serde_json::to_value(&msgs).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["content"][0]["type"], "text");
        assert_eq!(json[0]["content"][0]["text"], "read");
        assert_eq!(json[0]["content"][1]["type"], "image_url");
        assert_eq!(
            json[0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AA=="
        );
    }

    #[tokio::test]
    async fn test_complete_against_mock_server() {
        let server = MockCompletionServer::start_with_reply(r#"{"category": "交通費"}"#).await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "test-model").with_api_key("sk");

        let reply = backend.complete("classify").await.unwrap();
        assert_eq!(reply, r#"{"category": "交通費"}"#);
        assert!(backend.health_check().await);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockCompletionServer::start_failing().await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "test-model");

        let err = backend.complete("classify").await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:9", "test-model")
            .with_timeout(Some(Duration::from_secs(2)));
        assert!(backend.complete("classify").await.is_err());
        assert!(!backend.health_check().await);
    }
}
