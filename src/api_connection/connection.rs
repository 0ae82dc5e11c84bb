use dotenv::dotenv;
use reqwest::Client;
use std::env;
use std::error::Error;
use std::fmt;

use super::endpoints::{ChatCompletionRequest, ChatCompletionResponse};

#[derive(Debug)]
pub enum ApiConnectionError {
    MissingApiKey(String),
    NetworkError(reqwest::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
}

impl fmt::Display for ApiConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiConnectionError::MissingApiKey(key_name) => {
                write!(f, "API key not found in environment: {}", key_name)
            }
            ApiConnectionError::NetworkError(err) => write!(f, "Network error: {}", err),
            ApiConnectionError::ApiError { status, error_body } => {
                write!(f, "API error {}: {}", status, error_body)
            }
        }
    }
}

impl Error for ApiConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiConnectionError::NetworkError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiConnectionError {
    fn from(err: reqwest::Error) -> Self {
        ApiConnectionError::NetworkError(err)
    }
}

/// Chat-completion provider. Any OpenAI-compatible endpoint works: a local
/// Ollama server, OpenRouter, or the hosted OpenAI API.
#[derive(Clone, Debug)]
pub enum Provider {
    OpenAiCompatible {
        /// Base URL up to and including the API version, e.g.
        /// "http://localhost:11434/v1".
        base_url: String,
        model: String,
        /// Name of the environment variable holding the bearer token. None
        /// for endpoints that do not check authentication.
        api_key_env: Option<String>,
    },
}

impl Provider {
    pub fn open_ai_compatible(
        base_url: &str,
        model: &str,
        api_key_env: Option<String>,
    ) -> Self {
        dotenv().ok();
        Self::OpenAiCompatible {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key_env,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAiCompatible { model, .. } => model,
        }
    }

    pub async fn call_chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ApiConnectionError> {
        match self {
            Provider::OpenAiCompatible {
                base_url,
                api_key_env,
                ..
            } => {
                let client = Client::new();
                let url = format!("{}/chat/completions", base_url);

                let mut builder = client
                    .post(&url)
                    .header("Content-Type", "application/json");
                if let Some(key_env) = api_key_env {
                    dotenv().ok();
                    let api_key = env::var(key_env)
                        .map_err(|_| ApiConnectionError::MissingApiKey(key_env.clone()))?;
                    builder = builder.bearer_auth(api_key);
                }

                let response = builder.json(&request).send().await?;

                if response.status().is_success() {
                    let chat_response = response.json::<ChatCompletionResponse>().await?;
                    Ok(chat_response)
                } else {
                    let status = response.status();
                    let error_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());
                    Err(ApiConnectionError::ApiError { status, error_body })
                }
            }
        }
    }
}
