//! Structured extraction of travel details from free-text commands.
//!
//! `ExtractionClient::extract` sends the prompt upstream and returns the raw
//! answer untouched; `normalize` turns that answer into an
//! [`ExtractionResult`] or a [`ParseFailure`] that keeps the raw text.

mod prompt;

pub use prompt::build_extraction_prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmError};

/// Travel details extracted from one command. Every field is nullable.
///
/// Numbers keep their JSON representation, so `5000` stays an integer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionResult {
    pub location: Option<String>,
    pub budget: Option<serde_json::Number>,
    pub duration_hours: Option<serde_json::Number>,
    pub preferences: Option<Vec<String>>,
    pub group_size: Option<serde_json::Number>,
    pub special_requirements: Option<String>,
}

/// The model answered but its output did not match the extraction schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// The model's answer exactly as received
    pub raw_output: String,
    /// Parser diagnostic
    pub parsing_error: String,
}

/// What a completed task stores as its result.
///
/// `Unparsed` is listed first so records holding a parse failure are not
/// mistaken for an all-null extraction when read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Unparsed(ParseFailure),
    Parsed(ExtractionResult),
}

impl ExtractionOutcome {
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, ExtractionOutcome::Unparsed(_))
    }
}

impl From<Result<ExtractionResult, ParseFailure>> for ExtractionOutcome {
    fn from(result: Result<ExtractionResult, ParseFailure>) -> Self {
        match result {
            Ok(parsed) => ExtractionOutcome::Parsed(parsed),
            Err(failure) => ExtractionOutcome::Unparsed(failure),
        }
    }
}

/// Extraction client bound to one upstream model client.
#[derive(Clone)]
pub struct ExtractionClient {
    llm: Arc<dyn LlmClient>,
}

impl ExtractionClient {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Ask the model to extract travel details from `text`.
    ///
    /// Returns the raw model output; upstream failures are propagated.
    pub async fn extract(&self, text: &str) -> Result<String, LlmError> {
        let prompt = build_extraction_prompt(text);
        self.llm.generate(&prompt).await
    }

    /// Parse a raw model answer into the extraction schema.
    pub fn normalize(raw: &str) -> Result<ExtractionResult, ParseFailure> {
        let body = strip_code_fence(raw);
        serde_json::from_str::<ExtractionResult>(body).map_err(|e| ParseFailure {
            raw_output: raw.to_string(),
            parsing_error: format!("Failed to parse model output as extraction JSON: {}", e),
        })
    }
}

/// Remove a surrounding Markdown code fence, if any.
///
/// Either fence may be missing; an info string such as `json` on the
/// opening fence is dropped with it.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.split_once('\n') {
            Some((info, remainder)) if is_info_string(info) => remainder,
            Some(_) => rest,
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }

    let trimmed = body.trim_end();
    if let Some(rest) = trimmed.strip_suffix("```") {
        body = rest;
    }

    body.trim()
}

fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
        answer: String,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn strip_code_fence_handles_all_shapes() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```\n"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn normalize_parses_fenced_output() {
        let raw = "```json\n{ \"location\": \"Goa\", \"budget\": 5000, \"duration_hours\": 8, \"preferences\": [\"beach vibes\", \"party\"], \"group_size\": null, \"special_requirements\": null }\n```";
        let result = ExtractionClient::normalize(raw).expect("parses");
        assert_eq!(result.location.as_deref(), Some("Goa"));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "location": "Goa",
                "budget": 5000,
                "duration_hours": 8,
                "preferences": ["beach vibes", "party"],
                "group_size": null,
                "special_requirements": null
            })
        );
    }

    #[test]
    fn normalize_fills_missing_fields_with_null() {
        let result = ExtractionClient::normalize("{\"location\": \"Paris\"}").expect("parses");
        assert_eq!(result.location.as_deref(), Some("Paris"));
        assert!(result.budget.is_none());
        assert!(result.preferences.is_none());
    }

    #[test]
    fn normalize_keeps_raw_text_on_failure() {
        let raw = "Sorry, I can't help with that.";
        let failure = ExtractionClient::normalize(raw).unwrap_err();
        assert_eq!(failure.raw_output, raw);
        assert!(failure.parsing_error.contains("Failed to parse"));

        let wrong_type = ExtractionClient::normalize("{\"budget\": \"lots\"}").unwrap_err();
        assert_eq!(wrong_type.raw_output, "{\"budget\": \"lots\"}");
    }

    #[test]
    fn outcome_round_trips_both_variants() {
        let failure = ExtractionOutcome::Unparsed(ParseFailure {
            raw_output: "nope".to_string(),
            parsing_error: "bad".to_string(),
        });
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value, json!({"raw_output": "nope", "parsing_error": "bad"}));
        let back: ExtractionOutcome = serde_json::from_value(value).unwrap();
        assert!(back.is_parse_failure());

        let parsed = ExtractionOutcome::Parsed(ExtractionResult::default());
        let back: ExtractionOutcome =
            serde_json::from_value(serde_json::to_value(&parsed).unwrap()).unwrap();
        assert_eq!(back, parsed);
    }

    #[tokio::test]
    async fn extract_sends_prompt_and_returns_raw_answer() {
        let llm = Arc::new(RecordingLlm {
            prompts: Mutex::new(Vec::new()),
            answer: "```json\n{}\n```".to_string(),
        });
        let client = ExtractionClient::new(llm.clone());

        let raw = client.extract("beach day in Goa").await.expect("extract");
        assert_eq!(raw, "```json\n{}\n```");

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0], build_extraction_prompt("beach day in Goa"));
    }
}
