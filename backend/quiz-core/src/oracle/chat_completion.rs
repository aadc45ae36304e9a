use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use super::{error_text, Oracle};
use crate::config::OracleConfig;
use crate::metrics::ORACLE_REQUEST_DURATION_SECONDS;
use crate::utils::retry::{retry_async_if, RetryConfig};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle API key is not configured")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("oracle returned {0}: {1}")]
    Status(StatusCode, String),

    #[error("oracle returned no choices")]
    EmptyResponse,
}

impl OracleError {
    /// Rate limits, server errors and network failures are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Network(_) => true,
            OracleError::Status(status, _) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            OracleError::MissingApiKey | OracleError::EmptyResponse => false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct ChatCompletionOracle {
    http_client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryConfig,
}

impl ChatCompletionOracle {
    pub fn new(config: &OracleConfig) -> anyhow::Result<Self> {
        let http_client = Client::builder().timeout(config.timeout()).build()?;
        if config.api_key.is_none() {
            tracing::warn!("No oracle API key configured; oracle calls will return error text");
        }

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            retry: config.retry(),
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self.api_key.as_deref().ok_or(OracleError::MissingApiKey)?;
        let url = format!("{}/chat/completions", self.api_url);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OracleError::Status(status, error_text));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or(OracleError::EmptyResponse)
    }
}

#[async_trait]
impl Oracle for ChatCompletionOracle {
    async fn send(&self, prompt: &str) -> String {
        let started = Instant::now();
        tracing::debug!(
            "Calling oracle model={} prompt_chars={}",
            self.model,
            prompt.chars().count()
        );

        let result = retry_async_if(
            self.retry.clone(),
            || self.complete(prompt),
            OracleError::is_transient,
        )
        .await;

        ORACLE_REQUEST_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Oracle request failed: {}", e);
                error_text(e)
            }
        }
    }
}
