use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One turn of conversation context, already in the provider's vocabulary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Something that turns an ordered conversation into reply text.
///
/// `Ok(None)` means the provider answered successfully but produced no usable
/// text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[CompletionMessage],
    ) -> Result<Option<String>, CompletionError>;
}

#[derive(Serialize, Debug)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [CompletionMessage],
}

#[derive(Deserialize, Debug)]
struct OpenAIChatResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoice {
    message: Option<OpenAIChoiceMessage>,
}

#[derive(Deserialize, Debug)]
struct OpenAIChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible `chat/completions` client.
pub struct OpenAICompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAICompletion {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompletion {
    async fn complete(
        &self,
        messages: &[CompletionMessage],
    ) -> Result<Option<String>, CompletionError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&OpenAIChatRequest {
                model: &self.model,
                messages,
            });
        if !self.api_key.is_empty() {
            request = request.header(AUTHORIZATION, format!("Bearer {}", self.api_key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // An unparseable body counts as "no reply", not as a failure.
        let text = response.text().await?;
        Ok(extract_reply(&text))
    }
}

fn extract_reply(body: &str) -> Option<String> {
    let parsed: OpenAIChatResponse = serde_json::from_str(body).ok()?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
}
