use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_LLM_CONFIG_PATH: &str = "config/llm_config.json";
pub const ENV_PREFIX: &str = "EDGAR_LLM";

/// Settings for the text-generation provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".into()
}

fn default_model() -> String {
    "llama3.2".into()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: default_provider(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// File (if present) then `EDGAR_LLM_*` environment variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::layered(path.as_ref(), Environment::with_prefix(ENV_PREFIX))
    }

    fn layered(path: &Path, env: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env.try_parsing(true))
            .build()
            .with_context(|| format!("reading LLM settings from {}", path.display()))?;
        settings
            .try_deserialize()
            .context("invalid LLM settings")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Tests ──
