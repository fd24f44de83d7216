//! Prompt templates and the placeholder renderer.
//!
//! Templates are fixed text with `{name}`-style placeholders. Rendering is a
//! single pass: text substituted into a placeholder is never expanded again.
//! Literal braces are written doubled (`{{`, `}}`).
//!
//! Every template asks for exactly one JSON object:
//! - section templates: `{"content": "<markdown>"}`
//! - policy stances: `{"stances": [{"issue": "...", "stance": "..."}]}`
//! - profile: `{"party": "...", "bio": "..."}`
//! - chat answers: `{"answer": "..."}`

use polibrief_core::SourceDocument;
use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([a-z_]+)\}").expect("placeholder pattern should compile")
});

/// Appended to a prompt when the first answer could not be parsed.
pub const STRICT_JSON_SUFFIX: &str = "\n\nIMPORTANT: Your previous answer could not be parsed. \
Return ONLY a valid JSON object matching the format described above. \
Do not wrap it in markdown code fences and do not add any text before or after it.";

const TRUNCATION_MARKER: &str = "... [content truncated due to length]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("Missing prompt variable: {0}")]
    MissingVariable(String),
}

/// Identifies one of the fixed templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateId {
    Background,
    Accomplishments,
    Criticisms,
    Summary,
    PolicyStances,
    Profile,
    ChatAnswer,
}

impl TemplateId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Accomplishments => "accomplishments",
            Self::Criticisms => "criticisms",
            Self::Summary => "summary",
            Self::PolicyStances => "policy_stances",
            Self::Profile => "profile",
            Self::ChatAnswer => "chat_answer",
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Self::Background => BACKGROUND,
            Self::Accomplishments => ACCOMPLISHMENTS,
            Self::Criticisms => CRITICISMS,
            Self::Summary => SUMMARY,
            Self::PolicyStances => POLICY_STANCES,
            Self::Profile => PROFILE,
            Self::ChatAnswer => CHAT_ANSWER,
        }
    }

    /// Variables that must be present and non-blank.
    fn non_blank(&self) -> &'static [&'static str] {
        match self {
            Self::Summary => &["name", "background", "accomplishments", "criticisms"],
            Self::ChatAnswer => &["name", "question"],
            _ => &["name"],
        }
    }
}

impl From<polibrief_core::Section> for TemplateId {
    fn from(section: polibrief_core::Section) -> Self {
        use polibrief_core::Section;
        match section {
            Section::Background => Self::Background,
            Section::Accomplishments => Self::Accomplishments,
            Section::Criticisms => Self::Criticisms,
            Section::Summary => Self::Summary,
        }
    }
}

/// Named values for one rendering.
#[derive(Debug, Clone, Default)]
pub struct PromptVars {
    values: HashMap<String, String>,
}

impl PromptVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Render `template` with `vars`. Extra variables are ignored.
pub fn render(template: TemplateId, vars: &PromptVars) -> Result<String, PromptError> {
    for name in template.non_blank() {
        match vars.get(name) {
            Some(v) if !v.trim().is_empty() => {}
            _ => return Err(PromptError::MissingVariable((*name).to_string())),
        }
    }

    let text = template.text();
    let mut out = String::with_capacity(text.len() * 2);
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&text[last..m.start()]);
        match (m.as_str(), caps.get(1)) {
            ("{{", _) => out.push('{'),
            ("}}", _) => out.push('}'),
            (_, Some(name)) => {
                let value = vars
                    .get(name.as_str())
                    .ok_or_else(|| PromptError::MissingVariable(name.as_str().to_string()))?;
                out.push_str(value);
            }
            (other, None) => out.push_str(other),
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

/// Number the documents and bound their size for inclusion in a prompt.
///
/// Each document keeps at most `per_doc_chars` characters and the whole block
/// at most `total_chars`, followed by a truncation marker when cut.
pub fn format_sources(docs: &[SourceDocument], per_doc_chars: usize, total_chars: usize) -> String {
    let text = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}: {}", i + 1, take_chars(&doc.content, per_doc_chars)))
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.chars().count() > total_chars {
        format!("{}{TRUNCATION_MARKER}", take_chars(&text, total_chars))
    } else {
        text
    }
}

fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// --- templates ---

const BACKGROUND: &str = r#"You are a non-partisan political researcher. Using ONLY the source documents below, write the background of {name}, who serves or served as {position}.

Cover, where the sources allow: early life and education, career before politics, political career and offices held, party affiliation, and notable personal or business interests.

Requirements:
- At least 300 words, written as markdown bullet points grouped under short bold headings.
- Cite sources inline as [Document N] after each factual claim.
- Do not speculate; if the sources are silent on a topic, say so briefly.

Return a single JSON object of the form {{"content": "<markdown text>"}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const ACCOMPLISHMENTS: &str = r#"You are a non-partisan political researcher. Using ONLY the source documents below, list the accomplishments of {name}, who serves or served as {position}.

Include legislation authored or passed, policy results, executive actions, awards, and other concrete achievements. Prefer specific facts (dates, bill names, figures) over general praise.

Requirements:
- At least 300 words, written as markdown bullet points, most significant first.
- Cite sources inline as [Document N] after each factual claim.
- Report what the sources attribute to {name}; do not editorialize.

Return a single JSON object of the form {{"content": "<markdown text>"}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const CRITICISMS: &str = r#"You are a non-partisan political researcher. Using ONLY the source documents below, describe the criticisms, controversies, and allegations concerning {name}, who serves or served as {position}.

Include policy criticisms, ethics investigations, scandals, and notable opposition. For each item, note the outcome or the politician's response when the sources give one.

Requirements:
- At least 300 words, written as markdown bullet points.
- Cite sources inline as [Document N] after each factual claim.
- Distinguish proven findings from allegations.

Return a single JSON object of the form {{"content": "<markdown text>"}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const SUMMARY: &str = r#"You are a non-partisan political analyst. Write a balanced summary judgment of {name}, who serves or served as {position}, based on the research below and the source documents.

BACKGROUND:
{background}

ACCOMPLISHMENTS:
{accomplishments}

CRITICISMS:
{criticisms}

Requirements:
- At least 200 words of markdown: an overall assessment, the strongest points, the most serious concerns, and what voters should watch.
- Weigh accomplishments against criticisms fairly; do not take a partisan side.
- Cite sources inline as [Document N] where a claim comes from the documents.

Return a single JSON object of the form {{"content": "<markdown text>"}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const POLICY_STANCES: &str = r#"You are a non-partisan political researcher. Using ONLY the source documents below, identify the stated or demonstrated positions of {name} ({position}) on major policy issues such as the economy, healthcare, immigration, education, the environment, and public safety.

Requirements:
- One entry per issue the sources actually address; skip issues they do not cover.
- Each stance is one or two sentences and cites its source as [Document N].

Return a single JSON object of the form {{"stances": [{{"issue": "<issue>", "stance": "<stance>"}}]}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const PROFILE: &str = r#"You are a non-partisan political researcher. Using ONLY the source documents below, give the party affiliation and a short biography of {name} ({position}).

Requirements:
- "party": the current party affiliation as a short name (for example "Democratic", "Republican", "Independent"), or an empty string if the sources do not say.
- "bio": two or three plain sentences covering current office, prior offices, and background. No markdown, no citations.

Return a single JSON object of the form {{"party": "<party>", "bio": "<bio>"}} and nothing else.

SOURCE DOCUMENTS:
{content_text}
"#;

const CHAT_ANSWER: &str = r#"You are a helpful, non-partisan assistant answering questions about {name} ({position}). Base your answer on the research report below. If the report does not cover the question, say so and answer only with widely known, verifiable facts.

RESEARCH REPORT:
{report}

PREVIOUS QUESTIONS IN THIS CHAT:
{history}

QUESTION:
{question}

Answer in clear markdown, at most 300 words. Return a single JSON object of the form {{"answer": "<markdown text>"}} and nothing else.
"#;
