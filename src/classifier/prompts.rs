use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::categories::CategorySet;
use crate::error::ClassifierError;

const RESPONSE_FORMAT: &str = "CLASSIFICATION:\nEvent Type: [Category], Relevant: [true/false]";
const DEFAULT_EXAMPLE_REASONING: &str = "Analysis of the key factors and materiality.";

/// How the classification request is phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    Basic,
    Detailed,
    #[serde(rename = "cot")]
    ChainOfThought,
    FewShot,
}

impl PromptStrategy {
    pub const ALL: [PromptStrategy; 4] = [
        PromptStrategy::Basic,
        PromptStrategy::Detailed,
        PromptStrategy::ChainOfThought,
        PromptStrategy::FewShot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Detailed => "detailed",
            Self::ChainOfThought => "cot",
            Self::FewShot => "few_shot",
        }
    }
}

impl fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptStrategy {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            "cot" | "chain_of_thought" | "chainofthought" => Ok(Self::ChainOfThought),
            "few_shot" | "fewshot" => Ok(Self::FewShot),
            _ => Err(ClassifierError::InvalidStrategy(s.to_string())),
        }
    }
}

/// A worked example shown ahead of the real filing in few-shot prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub text: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    pub classification: String,
}

impl FewShotExample {
    fn new(text: &str, reasoning: &str, classification: &str) -> Self {
        FewShotExample {
            text: text.to_string(),
            reasoning: Some(reasoning.to_string()),
            classification: classification.to_string(),
        }
    }
}

/// Built-in examples: an acquisition, an earnings release and an executive appointment.
pub fn default_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample::new(
            "Apple Inc. announced the acquisition of XYZ Corp for $1.2 billion...",
            "This is a significant acquisition announcement involving a substantial financial transaction. The $1.2 billion value indicates material impact on Apple's financial position and business strategy.",
            "Event Type: Acquisition, Relevant: true",
        ),
        FewShotExample::new(
            "The company announced quarterly earnings results showing 15% revenue growth...",
            "Quarterly earnings with significant growth are highly material to investors as they directly impact stock valuation and demonstrate business performance.",
            "Event Type: Financial Event, Relevant: true",
        ),
        FewShotExample::new(
            "John Smith was appointed as new Chief Technology Officer...",
            "Executive appointments at the CTO level can signal strategic direction changes and are relevant for investor assessment of company leadership and technology strategy.",
            "Event Type: Personnel Change, Relevant: true",
        ),
    ]
}

/// Render the prompt for `strategy`. `examples` only matters for few-shot.
pub fn build_prompt(
    strategy: PromptStrategy,
    text: &str,
    categories: &CategorySet,
    examples: Option<&[FewShotExample]>,
) -> String {
    let names = categories.names();
    match strategy {
        PromptStrategy::Basic => basic(text, &names),
        PromptStrategy::Detailed => detailed(text, categories),
        PromptStrategy::ChainOfThought => chain_of_thought(text, &names),
        PromptStrategy::FewShot => few_shot(text, &names, examples),
    }
}

pub fn basic(text: &str, names: &[&str]) -> String {
    format!(
        "Classify the following 8-K filing event:

{text}

Choose from these categories:
{categories}

Please provide your response in this exact structure:

REASONING:
[Provide a clear explanation of your analysis, including:
- What specific event is being reported
- Key factors that led to your classification decision
- Why this event is or isn't relevant for investors]

{RESPONSE_FORMAT}

Begin your analysis:",
        categories = names.join(", "),
    )
}

pub fn detailed(text: &str, categories: &CategorySet) -> String {
    let descriptions: Vec<String> = categories
        .iter()
        .map(|c| {
            let mut line = format!("- {}: {}", c.name, c.description);
            if !c.keywords.is_empty() {
                line.push_str(&format!(" (Keywords: {})", c.keywords.join(", ")));
            }
            line
        })
        .collect();

    format!(
        "You are an expert financial analyst. Classify the following 8-K filing event:

Filing Content:
{text}

Event Categories:
{descriptions}

Instructions:
1. Read the filing content carefully
2. Identify the main business event being reported
3. Choose the most appropriate category from the list above
4. Determine if this event is relevant/significant for investors

An event is RELEVANT if it could materially impact:
- Stock price
- Company's financial performance
- Business operations
- Competitive position
- Strategic direction

An event is NOT RELEVANT if it's:
- Routine administrative filing
- Minor operational change
- Scheduled/expected announcement
- Immaterial to business performance

Please provide your response in this exact structure:

REASONING:
[Provide a comprehensive analysis including:
- Summary of the key event being reported
- Analysis of which category best fits and why
- Assessment of materiality and investor impact
- Justification for relevance determination]

{RESPONSE_FORMAT}

Begin your analysis:",
        descriptions = descriptions.join("\n"),
    )
}

pub fn chain_of_thought(text: &str, names: &[&str]) -> String {
    format!(
        "Analyze this 8-K filing step by step:

Filing Content:
{text}

Available Categories:
{categories}

Please provide your response in this exact structure:

REASONING:
Step 1: Identify the key facts
- What specific event is being reported?
- Who are the parties involved?
- What are the financial/business implications?

Step 2: Match to category
- Which category best fits this event?
- Why does it fit this category better than others?

Step 3: Assess significance
- Could this materially impact the company's business?
- Would investors consider this important?
- Is this routine or exceptional?

{RESPONSE_FORMAT}

Begin your step-by-step analysis:",
        categories = names.join(", "),
    )
}

pub fn few_shot(text: &str, names: &[&str], examples: Option<&[FewShotExample]>) -> String {
    let defaults;
    let examples = match examples {
        Some(examples) => examples,
        None => {
            defaults = default_examples();
            &defaults[..]
        }
    };

    let mut shown = Vec::with_capacity(examples.len() * 7);
    for (i, example) in examples.iter().enumerate() {
        shown.push(format!("Example {}:", i + 1));
        shown.push(format!("Text: {}", example.text));
        shown.push("REASONING:".to_string());
        shown.push(
            example
                .reasoning
                .clone()
                .unwrap_or_else(|| DEFAULT_EXAMPLE_REASONING.to_string()),
        );
        shown.push("CLASSIFICATION:".to_string());
        shown.push(example.classification.clone());
        shown.push(String::new());
    }

    format!(
        "Classify 8-K filing events into these categories:
{categories}

Here are some examples of the expected format:

{examples}

Now classify this filing using the same structure:

Text: {text}

Please provide your response in this exact structure:

REASONING:
[Your detailed analysis here]

{RESPONSE_FORMAT}

Begin your analysis:",
        categories = names.join(", "),
        examples = shown.join("\n"),
    )
}

/// Ask the model to judge an existing classification as VALID or INVALID.
pub fn validation_prompt(text: &str, classification: &str, names: &[&str]) -> String {
    format!(
        "Please validate this event classification:

Original Filing:
{text}

Proposed Classification: {classification}

Valid Categories: {categories}

Please provide your response in this exact structure:

REASONING:
[Analyze the following questions:
1. Is the event type correct?
2. Is the relevance assessment appropriate?
3. Does the classification make logical sense?
4. Provide specific justification for your assessment]

VALIDATION:
Status: [VALID or INVALID]
Issues: [If INVALID, describe the specific problems]

Begin your validation analysis:",
        categories = names.join(", "),
    )
}

// ── Tests ──
