pub mod categories;
pub mod prompts;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::Result;
use crate::llm::TextGenerator;
use crate::parser::response::{parse_response, ClassificationResult};
pub use categories::{CategoryDescriptor, CategorySet};
pub use prompts::{build_prompt, FewShotExample, PromptStrategy};

/// Additional attempts after the first.
pub const DEFAULT_MAX_RETRIES: u32 = 2;
const PREVIEW_CHARS: usize = 200;

/// What happened on one model call.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Parsed { response: String },
    Unparseable { response: String },
    Empty,
    Failed { error: String },
}

/// Result of a classification plus every attempt it took.
#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    pub result: Option<ClassificationResult>,
    pub attempts: Vec<Attempt>,
}

impl ClassificationOutcome {
    /// Raw model output of each attempt that produced any.
    pub fn raw_responses(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter_map(|a| match a {
                Attempt::Parsed { response } | Attempt::Unparseable { response } => Some(response.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Drives prompt → model → parse with bounded retries.
///
/// Holds no mutable state; one instance can serve any number of sequential
/// or concurrent requests.
pub struct EventClassifier {
    generator: Arc<dyn TextGenerator>,
    categories: CategorySet,
    timeout: Option<Duration>,
}

impl EventClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, categories: CategorySet) -> Self {
        EventClassifier {
            generator,
            categories,
            timeout: None,
        }
    }

    /// Build with categories read from `path`. A missing file is fatal.
    pub fn from_config_file(generator: Arc<dyn TextGenerator>, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(generator, CategorySet::load(path)?))
    }

    /// Per-call model timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn prompt(&self, strategy: PromptStrategy, text: &str, examples: Option<&[FewShotExample]>) -> String {
        build_prompt(strategy, text, &self.categories, examples)
    }

    pub async fn classify(
        &self,
        text: &str,
        strategy: PromptStrategy,
        examples: Option<&[FewShotExample]>,
        max_retries: Option<u32>,
    ) -> Option<ClassificationResult> {
        self.classify_detailed(text, strategy, examples, max_retries, None)
            .await
            .result
    }

    /// Like [`classify`](Self::classify) but keeps the attempt history.
    /// `label` tags the log span, e.g. with an accession number.
    pub async fn classify_detailed(
        &self,
        text: &str,
        strategy: PromptStrategy,
        examples: Option<&[FewShotExample]>,
        max_retries: Option<u32>,
        label: Option<&str>,
    ) -> ClassificationOutcome {
        let span = info_span!("classify", %strategy, label = label.unwrap_or("-"));
        self.run_attempts(text, strategy, examples, max_retries.unwrap_or(DEFAULT_MAX_RETRIES))
            .instrument(span)
            .await
    }

    async fn run_attempts(
        &self,
        text: &str,
        strategy: PromptStrategy,
        examples: Option<&[FewShotExample]>,
        max_retries: u32,
    ) -> ClassificationOutcome {
        let mut outcome = ClassificationOutcome::default();
        if text.trim().is_empty() {
            warn!("Empty text provided for classification");
            return outcome;
        }

        let prompt = self.prompt(strategy, text, examples);
        let names = self.categories.names();
        let total = max_retries + 1;

        for attempt in 1..=total {
            debug!(attempt, total, "Classification attempt");

            let response = match self.generator.generate(&prompt, self.timeout).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "Model call failed");
                    outcome.attempts.push(Attempt::Failed { error: e.to_string() });
                    continue;
                }
            };

            if response.trim().is_empty() {
                warn!(attempt, "Empty response from model");
                outcome.attempts.push(Attempt::Empty);
                continue;
            }

            match parse_response(&response, &names) {
                Some(mut result) => {
                    if let Some(descriptor) = self.categories.get(&result.event_type) {
                        result.relevant = descriptor.is_relevant;
                    }
                    info!(
                        attempt,
                        event_type = %result.event_type,
                        relevant = result.relevant,
                        "Classified"
                    );
                    outcome.attempts.push(Attempt::Parsed { response });
                    outcome.result = Some(result);
                    return outcome;
                }
                None => {
                    warn!(attempt, preview = %preview(&response), "Unparseable model response");
                    outcome.attempts.push(Attempt::Unparseable { response });
                }
            }
        }

        warn!(attempts = total, "Classification failed after all attempts");
        outcome
    }

    /// Classify each text in order, one at a time.
    pub async fn classify_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        strategy: PromptStrategy,
    ) -> Vec<Option<ClassificationResult>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            info!("Classifying text {}/{}", i + 1, texts.len());
            results.push(self.classify(text.as_ref(), strategy, None, None).await);
        }
        results
    }

    /// Ask the model whether `proposed` fits `text`. Any failure counts as invalid.
    pub async fn validate(&self, text: &str, proposed: &str) -> bool {
        let prompt = prompts::validation_prompt(text, proposed, &self.categories.names());
        match self.generator.generate(&prompt, self.timeout).await {
            Ok(response) => is_valid_judgment(&response),
            Err(e) => {
                warn!(error = %e, "Validation call failed");
                false
            }
        }
    }
}

fn is_valid_judgment(response: &str) -> bool {
    let upper = response.to_uppercase();
    upper.contains("VALID") && !upper.contains("INVALID")
}

fn preview(s: &str) -> String {
    if s.chars().count() <= PREVIEW_CHARS {
        s.to_string()
    } else {
        let head: String = s.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}

// ── Tests ──
