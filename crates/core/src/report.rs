//! Research report domain types.
//!
//! A report is identified by its normalized `(name, position)` pair. The four
//! narrative sections are produced by separate generation calls and are only
//! persisted as a report once all four exist; until then they live in a
//! [`ResearchRun`].

use crate::source::SourceDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Normalized identity of a report.
///
/// Whitespace is trimmed and collapsed; comparison and hashing are
/// case-insensitive while the display casing of the first request is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportKey {
    pub name: String,
    pub position: String,
}

impl ReportKey {
    pub fn new(name: &str, position: &str) -> Self {
        Self {
            name: collapse_whitespace(name),
            position: collapse_whitespace(position),
        }
    }

    /// Lower-cased name used for lookups.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Lower-cased position used for lookups.
    pub fn position_key(&self) -> String {
        self.position.to_lowercase()
    }
}

impl PartialEq for ReportKey {
    fn eq(&self, other: &Self) -> bool {
        self.name_key() == other.name_key() && self.position_key() == other.position_key()
    }
}

impl Eq for ReportKey {}

impl Hash for ReportKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name_key().hash(state);
        self.position_key().hash(state);
    }
}

impl std::fmt::Display for ReportKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.position.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.position)
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One of the four narrative sections of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Background,
    Accomplishments,
    Criticisms,
    Summary,
}

impl Section {
    /// The sections that can be generated independently of each other.
    pub const INDEPENDENT: [Section; 3] = [
        Section::Background,
        Section::Accomplishments,
        Section::Criticisms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Background => "background",
            Section::Accomplishments => "accomplishments",
            Section::Criticisms => "criticisms",
            Section::Summary => "summary",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a research run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchState {
    NotStarted,
    GatheringSources,
    BackgroundDone,
    AccomplishmentsDone,
    CriticismsDone,
    SummaryDone,
    Failed,
}

impl ResearchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::GatheringSources => "gathering_sources",
            Self::BackgroundDone => "background_done",
            Self::AccomplishmentsDone => "accomplishments_done",
            Self::CriticismsDone => "criticisms_done",
            Self::SummaryDone => "summary_done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SummaryDone | Self::Failed)
    }
}

impl std::str::FromStr for ResearchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "gathering_sources" => Ok(Self::GatheringSources),
            "background_done" => Ok(Self::BackgroundDone),
            "accomplishments_done" => Ok(Self::AccomplishmentsDone),
            "criticisms_done" => Ok(Self::CriticismsDone),
            "summary_done" => Ok(Self::SummaryDone),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown research state '{other}'")),
        }
    }
}

/// The narrative sections produced so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accomplishments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticisms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ReportSections {
    pub fn get(&self, section: Section) -> Option<&str> {
        match section {
            Section::Background => self.background.as_deref(),
            Section::Accomplishments => self.accomplishments.as_deref(),
            Section::Criticisms => self.criticisms.as_deref(),
            Section::Summary => self.summary.as_deref(),
        }
    }

    pub fn set(&mut self, section: Section, text: String) {
        let slot = match section {
            Section::Background => &mut self.background,
            Section::Accomplishments => &mut self.accomplishments,
            Section::Criticisms => &mut self.criticisms,
            Section::Summary => &mut self.summary,
        };
        *slot = Some(text);
    }

    pub fn has(&self, section: Section) -> bool {
        self.get(section).is_some_and(|s| !s.trim().is_empty())
    }

    /// Sections that are still missing, in generation order.
    pub fn missing(&self) -> Vec<Section> {
        [
            Section::Background,
            Section::Accomplishments,
            Section::Criticisms,
            Section::Summary,
        ]
        .into_iter()
        .filter(|s| !self.has(*s))
        .collect()
    }

    /// Sections that are done, in generation order.
    pub fn completed(&self) -> Vec<Section> {
        [
            Section::Background,
            Section::Accomplishments,
            Section::Criticisms,
            Section::Summary,
        ]
        .into_iter()
        .filter(|s| self.has(*s))
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// The furthest state reached when sections are counted in their fixed
    /// order. A later section finishing first does not skip a state.
    pub fn progress(&self) -> ResearchState {
        if !self.has(Section::Background) {
            return ResearchState::GatheringSources;
        }
        if !self.has(Section::Accomplishments) {
            return ResearchState::BackgroundDone;
        }
        if !self.has(Section::Criticisms) {
            return ResearchState::AccomplishmentsDone;
        }
        if !self.has(Section::Summary) {
            return ResearchState::CriticismsDone;
        }
        ResearchState::SummaryDone
    }
}

/// A politician's position on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStance {
    pub issue: String,
    pub stance: String,
}

/// Citation metadata for one gathered source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub query: String,
}

impl From<&SourceDocument> for SourceRef {
    fn from(doc: &SourceDocument) -> Self {
        Self {
            url: doc.url.clone(),
            title: doc.title.clone(),
            query: doc.query.clone(),
        }
    }
}

/// Identity details found alongside a report. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliticianProfile {
    #[serde(default)]
    pub party: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub image_url: String,
}

impl PoliticianProfile {
    pub fn is_empty(&self) -> bool {
        self.party.is_empty() && self.bio.is_empty() && self.image_url.is_empty()
    }
}

/// A complete, persisted research report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliticianReport {
    /// Store-assigned id (0 before the first insert)
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub position: String,
    pub background: String,
    pub accomplishments: String,
    pub criticisms: String,
    pub summary: String,
    #[serde(default)]
    pub policy_stances: Vec<PolicyStance>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default)]
    pub profile: PoliticianProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PoliticianReport {
    pub fn key(&self) -> ReportKey {
        ReportKey::new(&self.name, &self.position)
    }

    /// Build a report from a completed set of sections. Returns `None` while
    /// any narrative section is still missing.
    pub fn from_sections(
        key: &ReportKey,
        sections: &ReportSections,
        policy_stances: Vec<PolicyStance>,
        sources: Vec<SourceRef>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !sections.is_complete() {
            return None;
        }
        Some(Self {
            id: 0,
            name: key.name.clone(),
            position: key.position.clone(),
            background: sections.background.clone()?,
            accomplishments: sections.accomplishments.clone()?,
            criticisms: sections.criticisms.clone()?,
            summary: sections.summary.clone()?,
            policy_stances,
            sources,
            profile: PoliticianProfile::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// The report rendered as one markdown document, used as chat context.
    pub fn narrative(&self) -> String {
        let mut out = String::new();
        if !self.profile.party.is_empty() {
            out.push_str(&format!("Party: {}\n", self.profile.party));
        }
        if !self.profile.bio.is_empty() {
            out.push_str(&format!("{}\n", self.profile.bio));
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!(
            "## Background\n{}\n\n## Accomplishments\n{}\n\n## Criticisms\n{}\n\n## Summary\n{}",
            self.background, self.accomplishments, self.criticisms, self.summary
        ));
        if !self.policy_stances.is_empty() {
            out.push_str("\n\n## Policy Stances\n");
            for stance in &self.policy_stances {
                out.push_str(&format!("- **{}**: {}\n", stance.issue, stance.stance));
            }
        }
        out
    }
}

/// Persisted intermediate state of the report assembler for one key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRun {
    pub key: ReportKey,
    pub state: ResearchState,
    #[serde(default)]
    pub sections: ReportSections,
    /// Gathered documents, kept so a resumed run does not search again
    #[serde(default)]
    pub documents: Vec<SourceDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchRun {
    pub fn new(key: ReportKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            state: ResearchState::NotStarted,
            sections: ReportSections::default(),
            documents: Vec::new(),
            error: None,
            updated_at: now,
        }
    }

    /// An unfinished run that already gathered its sources. A run interrupted
    /// mid-flight (state neither terminal nor failed) also qualifies.
    pub fn is_resumable(&self) -> bool {
        self.state != ResearchState::SummaryDone && !self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_whitespace_and_case() {
        let a = ReportKey::new("  Jane   Doe ", "Senator");
        let b = ReportKey::new("jane doe", "SENATOR");
        assert_eq!(a, b);
        assert_eq!(a.name, "Jane Doe");
        assert_eq!(a.to_string(), "Jane Doe (Senator)");

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn progress_follows_fixed_order() {
        let mut sections = ReportSections::default();
        assert_eq!(sections.progress(), ResearchState::GatheringSources);

        // Criticisms finishing first does not advance the reported state.
        sections.set(Section::Criticisms, "c".into());
        assert_eq!(sections.progress(), ResearchState::GatheringSources);

        sections.set(Section::Background, "b".into());
        assert_eq!(sections.progress(), ResearchState::BackgroundDone);

        sections.set(Section::Accomplishments, "a".into());
        assert_eq!(sections.progress(), ResearchState::CriticismsDone);

        sections.set(Section::Summary, "s".into());
        assert_eq!(sections.progress(), ResearchState::SummaryDone);
        assert!(sections.is_complete());
    }

    #[test]
    fn blank_section_counts_as_missing() {
        let mut sections = ReportSections::default();
        sections.set(Section::Background, "   ".into());
        assert!(!sections.has(Section::Background));
        assert_eq!(sections.missing().len(), 4);
    }

    #[test]
    fn partial_sections_do_not_make_a_report() {
        let key = ReportKey::new("Jane Doe", "Mayor");
        let mut sections = ReportSections::default();
        sections.set(Section::Background, "b".into());
        assert!(PoliticianReport::from_sections(&key, &sections, vec![], vec![], Utc::now()).is_none());
    }

    #[test]
    fn state_string_roundtrip() {
        for state in [
            ResearchState::NotStarted,
            ResearchState::GatheringSources,
            ResearchState::BackgroundDone,
            ResearchState::AccomplishmentsDone,
            ResearchState::CriticismsDone,
            ResearchState::SummaryDone,
            ResearchState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<ResearchState>().unwrap(), state);
        }
        assert!("bogus".parse::<ResearchState>().is_err());
    }

    #[test]
    fn narrative_includes_stances() {
        let key = ReportKey::new("Jane Doe", "Mayor");
        let mut sections = ReportSections::default();
        for s in [
            Section::Background,
            Section::Accomplishments,
            Section::Criticisms,
            Section::Summary,
        ] {
            sections.set(s, format!("{s} text"));
        }
        let report = PoliticianReport::from_sections(
            &key,
            &sections,
            vec![PolicyStance {
                issue: "Housing".into(),
                stance: "Supports zoning reform".into(),
            }],
            vec![],
            Utc::now(),
        )
        .unwrap();
        let text = report.narrative();
        assert!(text.starts_with("## Background"));
        assert!(text.contains("## Summary\nsummary text"));
        assert!(text.contains("**Housing**: Supports zoning reform"));
    }

    #[test]
    fn narrative_leads_with_profile() {
        let key = ReportKey::new("Jane Doe", "Mayor");
        let mut sections = ReportSections::default();
        for s in [
            Section::Background,
            Section::Accomplishments,
            Section::Criticisms,
            Section::Summary,
        ] {
            sections.set(s, format!("{s} text"));
        }
        let mut report =
            PoliticianReport::from_sections(&key, &sections, vec![], vec![], Utc::now()).unwrap();
        assert!(report.profile.is_empty());
        report.profile.party = "Independent".into();
        report.profile.bio = "Mayor of Springfield since 2019.".into();
        assert!(
            report
                .narrative()
                .starts_with("Party: Independent\nMayor of Springfield since 2019.\n\n## Background")
        );
    }

    #[test]
    fn reports_without_profile_still_deserialize() {
        let json = serde_json::json!({
            "id": 1,
            "name": "Jane Doe",
            "background": "b",
            "accomplishments": "a",
            "criticisms": "c",
            "summary": "s",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let report: PoliticianReport = serde_json::from_value(json).unwrap();
        assert_eq!(report.profile, PoliticianProfile::default());
    }
}
