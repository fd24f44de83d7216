//! Test doubles shared by the research modules.

use async_trait::async_trait;
use polibrief_core::{GenerationRequest, ProviderError, Provider, SourceDocument};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Answers each prompt according to the template it was rendered from.
#[derive(Default)]
pub struct ScriptedProvider {
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every prompt of `kind` fail with a network error.
    pub fn fail(&self, kind: &'static str) {
        self.failing.lock().unwrap().insert(kind);
    }

    pub fn recover(&self, kind: &'static str) {
        self.failing.lock().unwrap().remove(kind);
    }

    pub fn calls(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

pub fn kind_of(prompt: &str) -> &'static str {
    if prompt.contains("write the background of") {
        "background"
    } else if prompt.contains("list the accomplishments of") {
        "accomplishments"
    } else if prompt.contains("describe the criticisms") {
        "criticisms"
    } else if prompt.contains("balanced summary judgment") {
        "summary"
    } else if prompt.contains("identify the stated or demonstrated positions") {
        "stances"
    } else if prompt.contains("give the party affiliation and a short biography") {
        "profile"
    } else if prompt.contains("answering questions about") {
        "chat"
    } else {
        "unknown"
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let kind = kind_of(&request.prompt);
        *self.calls.lock().unwrap().entry(kind).or_default() += 1;
        self.prompts.lock().unwrap().push(request.prompt);

        if self.failing.lock().unwrap().contains(kind) {
            return Err(ProviderError::Network(format!("{kind} unavailable")));
        }
        Ok(match kind {
            "stances" => {
                r#"{"stances": [{"issue": "Housing", "stance": "Supports zoning reform [Document 1]"}]}"#
                    .to_string()
            }
            "profile" => {
                r#"{"party": "Independent", "bio": "Jane Doe is a senator from Springfield."}"#
                    .to_string()
            }
            "chat" => r#"{"answer": "She chairs the finance committee."}"#.to_string(),
            other => format!(r#"{{"content": "{other} text"}}"#),
        })
    }
}

pub fn documents() -> Vec<SourceDocument> {
    vec![
        SourceDocument {
            url: "https://example.com/jane-doe".into(),
            title: "Jane Doe profile".into(),
            query: "Jane Doe Senator".into(),
            content: "Jane Doe is a senator who chairs the finance committee.".into(),
            image_url: None,
        },
        SourceDocument {
            url: "https://news.example.org/doe-vote".into(),
            title: "Doe casts deciding vote".into(),
            query: "Jane Doe accomplishments".into(),
            content: "The senator cast the deciding vote on the budget.".into(),
            image_url: Some("https://news.example.org/doe.jpg".into()),
        },
    ]
}
