//! Structured-output parsing.
//!
//! Models wrap JSON in code fences, prefix it with prose, or ignore the
//! contract entirely. [`parse_structured`] tries the fenced block, then the
//! whole text, then the outermost `{...}` span, and validates the result
//! against the expected schema.

use crate::error::ResearchError;
use crate::prompts::STRICT_JSON_SUFFIX;
use polibrief_core::{GenerationRequest, PolicyStance, Provider};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

/// A schema type that can reject well-formed but useless JSON.
pub trait StructuredOutput: DeserializeOwned {
    fn validate(&self) -> Result<(), String>;
}

/// `{"content": "<markdown>"}` for one report section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionOutput {
    #[serde(deserialize_with = "string_or_lines")]
    pub content: String,
}

impl StructuredOutput for SectionOutput {
    fn validate(&self) -> Result<(), String> {
        if self.content.trim().is_empty() {
            return Err("field 'content' is empty".into());
        }
        Ok(())
    }
}

/// `{"stances": [{"issue": ..., "stance": ...}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StancesOutput {
    pub stances: Vec<PolicyStance>,
}

impl StructuredOutput for StancesOutput {
    fn validate(&self) -> Result<(), String> {
        if self
            .stances
            .iter()
            .any(|s| s.issue.trim().is_empty() || s.stance.trim().is_empty())
        {
            return Err("a stance has an empty issue or stance".into());
        }
        Ok(())
    }
}

/// `{"party": ..., "bio": ...}`. Either may be missing, not both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileOutput {
    #[serde(default)]
    pub party: String,
    #[serde(default, deserialize_with = "string_or_lines")]
    pub bio: String,
}

impl StructuredOutput for ProfileOutput {
    fn validate(&self) -> Result<(), String> {
        if self.party.trim().is_empty() && self.bio.trim().is_empty() {
            return Err("fields 'party' and 'bio' are both empty".into());
        }
        Ok(())
    }
}

/// `{"answer": "<markdown>"}` for a chat question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatAnswerOutput {
    #[serde(deserialize_with = "string_or_lines")]
    pub answer: String,
}

impl StructuredOutput for ChatAnswerOutput {
    fn validate(&self) -> Result<(), String> {
        if self.answer.trim().is_empty() {
            return Err("field 'answer' is empty".into());
        }
        Ok(())
    }
}

/// Accept a string, or a list of strings joined as markdown lines.
fn string_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Text {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Text::deserialize(deserializer)? {
        Text::One(s) => s,
        Text::Many(lines) => lines.join("\n"),
    })
}

/// Candidate JSON spans in the order they are tried.
fn candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::new();

    if let Some((_, rest)) = text.split_once("```json") {
        out.push(rest.split("```").next().unwrap_or(rest).trim());
    } else if let Some((_, rest)) = text.split_once("```") {
        out.push(rest.split("```").next().unwrap_or(rest).trim());
    }

    out.push(text.trim());

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            out.push(&text[start..=end]);
        }
    }
    out
}

/// Extract and validate a `T` from raw model output.
pub fn parse_structured<T: StructuredOutput>(text: &str) -> Result<T, ResearchError> {
    let mut last_error = String::from("no JSON object found");
    for candidate in candidates(text) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => {
                return value
                    .validate()
                    .map(|_| value)
                    .map_err(ResearchError::Parse);
            }
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(ResearchError::Parse(last_error))
}

/// Outcome of asking for structured output.
#[derive(Debug)]
pub enum Structured<T> {
    Parsed(T),
    /// The model ignored the JSON contract twice; the last raw answer is kept.
    Unparsed { raw: String, error: String },
}

impl<T> Structured<T> {
    /// Treat an unparsed answer as a failure.
    pub fn into_parsed(self) -> Result<T, ResearchError> {
        match self {
            Self::Parsed(value) => Ok(value),
            Self::Unparsed { error, .. } => Err(ResearchError::Parse(error)),
        }
    }
}

/// Generate and parse a `T`, retrying once with a stricter instruction when
/// the first answer does not parse. Generation errors surface immediately.
pub async fn generate_structured<T: StructuredOutput>(
    provider: &dyn Provider,
    prompt: &str,
) -> Result<Structured<T>, ResearchError> {
    let raw = provider.generate(GenerationRequest::json(prompt)).await?;
    let first_error = match parse_structured::<T>(&raw) {
        Ok(value) => return Ok(Structured::Parsed(value)),
        Err(e) => e,
    };

    warn!(
        provider = provider.name(),
        error = %first_error,
        response_chars = raw.len(),
        "Model output did not parse, retrying with strict instruction"
    );

    let strict_prompt = format!("{prompt}{STRICT_JSON_SUFFIX}");
    let raw = provider.generate(GenerationRequest::json(strict_prompt)).await?;
    match parse_structured::<T>(&raw) {
        Ok(value) => Ok(Structured::Parsed(value)),
        Err(e) => {
            debug!(response_chars = raw.len(), "Strict retry did not parse either");
            Ok(Structured::Unparsed {
                raw,
                error: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use polibrief_core::ProviderError;
    use std::sync::Mutex;

    #[test]
    fn bare_json() {
        let out: SectionOutput = parse_structured(r#"{"content": "- point"}"#).unwrap();
        assert_eq!(out.content, "- point");
    }

    #[test]
    fn fenced_json_block() {
        let text = "Here you go:\n```json\n{\"content\": \"fenced\"}\n```\nThanks";
        let out: SectionOutput = parse_structured(text).unwrap();
        assert_eq!(out.content, "fenced");
    }

    #[test]
    fn bare_fence() {
        let text = "```\n{\"answer\": \"plain fence\"}\n```";
        let out: ChatAnswerOutput = parse_structured(text).unwrap();
        assert_eq!(out.answer, "plain fence");
    }

    #[test]
    fn prose_around_object() {
        let text = "Sure! {\"content\": \"embedded {braces} ok\"} Hope that helps.";
        let out: SectionOutput = parse_structured(text).unwrap();
        assert_eq!(out.content, "embedded {braces} ok");
    }

    #[test]
    fn list_content_is_joined() {
        let out: SectionOutput = parse_structured(r#"{"content": ["- a", "- b"]}"#).unwrap();
        assert_eq!(out.content, "- a\n- b");
    }

    #[test]
    fn empty_content_fails_validation() {
        let err = parse_structured::<SectionOutput>(r#"{"content": "  "}"#).unwrap_err();
        assert!(matches!(err, ResearchError::Parse(_)));
    }

    #[test]
    fn wrong_schema_fails() {
        assert!(parse_structured::<SectionOutput>(r#"{"background": "x"}"#).is_err());
        assert!(parse_structured::<SectionOutput>("just prose").is_err());
    }

    #[test]
    fn stances_parse() {
        let text = r#"{"stances": [{"issue": "Housing", "stance": "Supports zoning reform [Document 2]"}]}"#;
        let out: StancesOutput = parse_structured(text).unwrap();
        assert_eq!(out.stances.len(), 1);
        assert_eq!(out.stances[0].issue, "Housing");

        let empty: StancesOutput = parse_structured(r#"{"stances": []}"#).unwrap();
        assert!(empty.stances.is_empty());

        let blank = r#"{"stances": [{"issue": "", "stance": "x"}]}"#;
        assert!(parse_structured::<StancesOutput>(blank).is_err());
    }

    #[test]
    fn profile_needs_party_or_bio() {
        let out: ProfileOutput = parse_structured(r#"{"party": "Independent"}"#).unwrap();
        assert_eq!(out.party, "Independent");
        assert_eq!(out.bio, "");

        let out: ProfileOutput =
            parse_structured(r#"{"party": "", "bio": ["Mayor since 2019.", "Former judge."]}"#)
                .unwrap();
        assert_eq!(out.bio, "Mayor since 2019.\nFormer judge.");

        assert!(parse_structured::<ProfileOutput>(r#"{"party": " ", "bio": ""}"#).is_err());
    }

    /// Replays canned answers and records prompts.
    struct Replay {
        answers: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Replay {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for Replay {
        fn name(&self) -> &str {
            "replay"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
            assert!(request.json_output);
            self.prompts.lock().unwrap().push(request.prompt);
            self.answers
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ProviderError::Network("script exhausted".into()))
        }
    }

    #[tokio::test]
    async fn strict_retry_recovers() {
        let provider = Replay::new(&["not json", r#"{"content": "second try"}"#]);
        let out = generate_structured::<SectionOutput>(&provider, "PROMPT")
            .await
            .unwrap()
            .into_parsed()
            .unwrap();
        assert_eq!(out.content, "second try");

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], "PROMPT");
        assert!(prompts[1].starts_with("PROMPT"));
        assert!(prompts[1].contains("Return ONLY a valid JSON object"));
    }

    #[tokio::test]
    async fn second_failure_keeps_raw_text() {
        let provider = Replay::new(&["nope", "  still prose  "]);
        let out = generate_structured::<ChatAnswerOutput>(&provider, "P").await.unwrap();
        match out {
            Structured::Unparsed { raw, .. } => assert_eq!(raw, "  still prose  "),
            Structured::Parsed(_) => panic!("should not parse"),
        }
    }

    #[tokio::test]
    async fn provider_error_is_not_retried_here() {
        let provider = Replay::new(&[]);
        let err = generate_structured::<SectionOutput>(&provider, "P").await.unwrap_err();
        assert!(matches!(err, ResearchError::Provider(_)));
        assert_eq!(provider.prompts.lock().unwrap().len(), 1);
    }
}
