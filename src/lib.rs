//! 8-K filing event classification: markup cleaning, prompt rendering,
//! model response parsing and the retrying classifier that ties them together.

pub mod classifier;
pub mod config;
pub mod db;
pub mod edgar;
pub mod error;
pub mod llm;
pub mod parser;

pub use classifier::{EventClassifier, PromptStrategy};
pub use error::{ClassifierError, Result};
pub use parser::{extract, ClassificationResult};
