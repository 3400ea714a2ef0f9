pub mod ollama;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmConfig;
pub use ollama::OllamaProvider;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Anything that turns a prompt into free text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str, timeout: Option<Duration>) -> Result<String, LlmError>;

    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            other => Err(LlmError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// The single active provider, selected from configuration.
#[derive(Debug, Clone)]
pub enum LlmClient {
    Ollama(OllamaProvider),
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        match config.provider.parse::<Provider>()? {
            Provider::Ollama => Ok(LlmClient::Ollama(OllamaProvider::new(&config.model))),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            LlmClient::Ollama(_) => Provider::Ollama,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmClient::Ollama(p) => p.model(),
        }
    }

    pub async fn list_models(&self) -> Vec<String> {
        match self {
            LlmClient::Ollama(p) => p.list_models().await,
        }
    }

    pub async fn pull_model(&self) -> bool {
        match self {
            LlmClient::Ollama(p) => p.pull_model().await,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    fn name(&self) -> &'static str {
        match self {
            LlmClient::Ollama(p) => p.name(),
        }
    }

    async fn generate(&self, prompt: &str, timeout: Option<Duration>) -> Result<String, LlmError> {
        match self {
            LlmClient::Ollama(p) => p.generate(prompt, timeout).await,
        }
    }

    async fn is_available(&self) -> bool {
        match self {
            LlmClient::Ollama(p) => p.is_available().await,
        }
    }
}

// ── Tests ──
