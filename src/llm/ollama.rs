use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{LlmError, TextGenerator};

const BINARY: &str = "ollama";
const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);
const PULL_TIMEOUT: Duration = Duration::from_secs(300);

/// Local model runtime driven through the `ollama` command line.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    model: String,
    binary: String,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        OllamaProvider {
            model: model.into(),
            binary: BINARY.to_string(),
        }
    }

    /// Use another executable in place of `ollama` on the PATH.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Installed model names, empty if the runtime can't be reached.
    pub async fn list_models(&self) -> Vec<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("list").kill_on_drop(true);
        match timeout(LIST_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                parse_model_list(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(Ok(output)) => {
                debug!("ollama list exited with {}", output.status);
                Vec::new()
            }
            Ok(Err(e)) => {
                debug!("ollama list failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                debug!("ollama list timed out");
                Vec::new()
            }
        }
    }

    /// Download the configured model. Returns whether it succeeded.
    pub async fn pull_model(&self) -> bool {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["pull", &self.model])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        match timeout(PULL_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => true,
            Ok(Ok(output)) => {
                warn!("ollama pull {} failed: {}", self.model, String::from_utf8_lossy(&output.stderr).trim());
                false
            }
            Ok(Err(e)) => {
                warn!("ollama pull {} failed: {}", self.model, e);
                false
            }
            Err(_) => {
                warn!("ollama pull {} timed out after {:?}", self.model, PULL_TIMEOUT);
                false
            }
        }
    }

    async fn run(&self, prompt: &str) -> Result<String, LlmError> {
        let mut child = Command::new(&self.binary)
            .args(["run", &self.model])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LlmError::ProviderUnavailable(format!("failed to spawn ollama: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| LlmError::GenerationFailed(format!("writing prompt: {}", e)))?;
            // stdin dropped here so the model sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LlmError::GenerationFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(LlmError::GenerationFailed(format!(
                "ollama exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, limit: Option<Duration>) -> Result<String, LlmError> {
        let limit = limit.unwrap_or(DEFAULT_GENERATE_TIMEOUT);
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama run");

        // The availability check shares the caller's budget with the run.
        let call = async {
            if !self.is_available().await {
                return Err(LlmError::ProviderUnavailable(format!(
                    "ollama is not running or model {} is not installed",
                    self.model
                )));
            }
            self.run(prompt).await
        };
        match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(limit)),
        }
    }

    async fn is_available(&self) -> bool {
        let models = self.list_models().await;
        has_model(&models, &self.model)
    }
}

/// Model names from `ollama list` output (first column, header skipped).
pub fn parse_model_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// `llama3.2` matches an installed `llama3.2:latest`.
pub fn has_model(installed: &[String], model: &str) -> bool {
    installed.iter().any(|name| {
        name == model
            || name
                .split_once(':')
                .is_some_and(|(base, _)| base == model)
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_OUTPUT: &str = "NAME               ID              SIZE      MODIFIED\n\
llama3.2:latest    a80c4f17acd5    2.0 GB    3 weeks ago\n\
mistral:7b         f974a74358d6    4.1 GB    2 months ago\n\
\n";

    #[test]
    fn parses_list_output() {
        assert_eq!(parse_model_list(LIST_OUTPUT), vec!["llama3.2:latest", "mistral:7b"]);
    }

    #[test]
    fn header_only_is_empty() {
        assert!(parse_model_list("NAME ID SIZE MODIFIED\n").is_empty());
        assert!(parse_model_list("").is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn availability_check_counts_against_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("slow-ollama");
        std::fs::write(&fake, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let provider = OllamaProvider::new("llama3.2").with_binary(fake.to_string_lossy());
        let limit = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = provider.generate("Classify this filing.", Some(limit)).await.unwrap_err();

        assert!(matches!(err, LlmError::Timeout(d) if d == limit), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let provider = OllamaProvider::new("llama3.2").with_binary("/nonexistent/ollama");
        assert!(!provider.is_available().await);
        assert!(provider.list_models().await.is_empty());
        let err = provider.generate("prompt", Some(Duration::from_secs(5))).await.unwrap_err();
        assert!(matches!(err, LlmError::ProviderUnavailable(_)));
    }

    #[test]
    fn model_matching() {
        let installed = parse_model_list(LIST_OUTPUT);
        assert!(has_model(&installed, "llama3.2"));
        assert!(has_model(&installed, "llama3.2:latest"));
        assert!(has_model(&installed, "mistral"));
        assert!(!has_model(&installed, "llama3"));
        assert!(!has_model(&installed, "phi3"));
    }
}
