//! Report assembler. Drives one research run as a persisted state machine.
//!
//! ```text
//! NotStarted → GatheringSources → BackgroundDone → AccomplishmentsDone
//!            → CriticismsDone → SummaryDone
//! (any state) → Failed
//! ```
//!
//! Background, accomplishments, and criticisms are generated concurrently;
//! the summary waits for all three. The run is saved after every recorded
//! section, so a failed run keeps its partial results and a later call
//! generates only what is missing. Policy stances and the politician profile
//! are looked up last and never fail a run.

use crate::error::ResearchError;
use crate::parse::{generate_structured, ProfileOutput, SectionOutput, StancesOutput, Structured};
use crate::prompts::{format_sources, render, PromptVars, TemplateId};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use polibrief_config::ResearchConfig;
use polibrief_core::{
    PolicyStance, PoliticianProfile, PoliticianReport, Provider, ReportKey, ReportStore,
    ResearchRun, ResearchState, Section, SourceDocument, SourceGatherer, SourceRef,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Limits applied while assembling.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    pub per_document_chars: usize,
    pub total_content_chars: usize,
    /// Fetch policy stances after the summary
    pub policy_stances: bool,
    /// Look up party, bio, and image after the summary
    pub profile: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            per_document_chars: 5_000,
            total_content_chars: 100_000,
            policy_stances: true,
            profile: true,
        }
    }
}

impl From<&ResearchConfig> for AssemblerOptions {
    fn from(config: &ResearchConfig) -> Self {
        Self {
            per_document_chars: config.per_document_chars,
            total_content_chars: config.total_content_chars,
            policy_stances: config.policy_stances,
            profile: config.profile,
        }
    }
}

pub struct ReportAssembler {
    provider: Arc<dyn Provider>,
    gatherer: Arc<dyn SourceGatherer>,
    reports: Arc<dyn ReportStore>,
    options: AssemblerOptions,
}

impl ReportAssembler {
    pub fn new(
        provider: Arc<dyn Provider>,
        gatherer: Arc<dyn SourceGatherer>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            provider,
            gatherer,
            reports,
            options: AssemblerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssemblerOptions) -> Self {
        self.options = options;
        self
    }

    /// Assemble (or finish assembling) the report for `key` and persist it.
    ///
    /// With `force`, any previous run is discarded and sources are gathered
    /// again. Otherwise an unfinished run with stored sources is resumed.
    #[instrument(skip_all, fields(key = %key, force = force))]
    pub async fn run(&self, key: &ReportKey, force: bool) -> Result<PoliticianReport, ResearchError> {
        let mut run = self.start(key, force).await?;

        // ── Step 1: Gather sources ──
        if run.documents.is_empty() {
            self.advance(&mut run, ResearchState::GatheringSources).await?;
            let documents = match self.gatherer.gather(key).await {
                Ok(docs) => docs,
                Err(e) => return Err(self.fail(run, format!("Source gathering failed: {e}")).await),
            };
            if documents.is_empty() {
                let _ = self.fail(run, format!("No content found for {key}")).await;
                return Err(ResearchError::NoSources { key: key.clone() });
            }
            info!(
                gatherer = self.gatherer.name(),
                documents = documents.len(),
                "Sources gathered"
            );
            run.documents = documents;
            self.save(&mut run).await?;
        }

        let content_text = format_sources(
            &run.documents,
            self.options.per_document_chars,
            self.options.total_content_chars,
        );
        debug!(chars = content_text.len(), "Source text prepared");

        // ── Step 2: Independent sections, concurrently ──
        let no_prior = &PromptVars::new();
        let mut pending: FuturesUnordered<_> = Section::INDEPENDENT
            .into_iter()
            .filter(|s| !run.sections.has(*s))
            .map(|section| {
                let content_text = content_text.as_str();
                async move {
                    let result = self
                        .generate_section(key, section, content_text, no_prior)
                        .await;
                    (section, result)
                }
            })
            .collect();

        let mut first_error = None;
        while let Some((section, result)) = pending.next().await {
            match result {
                Ok(text) => {
                    run.sections.set(section, text);
                    self.save(&mut run).await?;
                    info!(section = section.as_str(), state = run.state.as_str(), "Section recorded");
                }
                Err(e) => {
                    warn!(section = section.as_str(), error = %e, "Section generation failed");
                    first_error.get_or_insert(format!("Failed to generate {}: {e}", section.as_str()));
                }
            }
        }
        drop(pending);
        if let Some(message) = first_error {
            return Err(self.fail(run, message).await);
        }

        // ── Step 3: Summary ──
        if !run.sections.has(Section::Summary) {
            let prior = PromptVars::new()
                .set("background", run.sections.background.clone().unwrap_or_default())
                .set(
                    "accomplishments",
                    run.sections.accomplishments.clone().unwrap_or_default(),
                )
                .set("criticisms", run.sections.criticisms.clone().unwrap_or_default());
            match self
                .generate_section(key, Section::Summary, &content_text, &prior)
                .await
            {
                Ok(text) => {
                    run.sections.set(Section::Summary, text);
                    self.save(&mut run).await?;
                    info!(state = run.state.as_str(), "Summary recorded");
                }
                Err(e) => {
                    let message = format!("Failed to generate summary: {e}");
                    return Err(self.fail(run, message).await);
                }
            }
        }

        // ── Step 4: Policy stances and profile (optional) ──
        let stances = async {
            if self.options.policy_stances {
                self.policy_stances(key, &content_text).await
            } else {
                Vec::new()
            }
        };
        let profile = async {
            if self.options.profile {
                self.profile(key, &content_text, &run.documents).await
            } else {
                PoliticianProfile::default()
            }
        };
        let (stances, profile) = futures::join!(stances, profile);

        // ── Step 5: Persist ──
        let sources: Vec<SourceRef> = run.documents.iter().map(SourceRef::from).collect();
        let mut report =
            PoliticianReport::from_sections(key, &run.sections, stances, sources, Utc::now())
                .ok_or_else(|| {
                    ResearchError::Core(polibrief_core::Error::Internal(
                        "report sections incomplete after summary".into(),
                    ))
                })?;
        report.profile = profile;
        let stored = self.reports.upsert_report(report).await?;
        self.reports.clear_run(key).await?;

        info!(report_id = stored.id, "Report assembled");
        Ok(stored)
    }

    async fn start(&self, key: &ReportKey, force: bool) -> Result<ResearchRun, ResearchError> {
        if force {
            self.reports.clear_run(key).await?;
            info!("Forced research, previous run discarded");
            return Ok(ResearchRun::new(key.clone(), Utc::now()));
        }
        match self.reports.get_run(key).await? {
            Some(mut run) if run.is_resumable() => {
                info!(
                    previous_state = run.state.as_str(),
                    missing = run.sections.missing().len(),
                    "Resuming research run"
                );
                run.key = key.clone();
                run.error = None;
                run.state = run.sections.progress();
                Ok(run)
            }
            _ => Ok(ResearchRun::new(key.clone(), Utc::now())),
        }
    }

    async fn generate_section(
        &self,
        key: &ReportKey,
        section: Section,
        content_text: &str,
        extra: &PromptVars,
    ) -> Result<String, ResearchError> {
        let mut vars = section_vars(key, content_text);
        for name in ["background", "accomplishments", "criticisms"] {
            if let Some(value) = extra.get(name) {
                vars = vars.set(name, value);
            }
        }
        let prompt = render(TemplateId::from(section), &vars)?;
        debug!(section = section.as_str(), prompt_chars = prompt.len(), "Generating section");
        let output = generate_structured::<SectionOutput>(self.provider.as_ref(), &prompt)
            .await?
            .into_parsed()?;
        Ok(output.content)
    }

    async fn policy_stances(&self, key: &ReportKey, content_text: &str) -> Vec<PolicyStance> {
        let prompt = match render(TemplateId::PolicyStances, &section_vars(key, content_text)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Policy stance prompt failed to render");
                return Vec::new();
            }
        };
        match generate_structured::<StancesOutput>(self.provider.as_ref(), &prompt).await {
            Ok(Structured::Parsed(out)) => {
                debug!(stances = out.stances.len(), "Policy stances parsed");
                out.stances
            }
            Ok(Structured::Unparsed { error, .. }) => {
                warn!(error = %error, "Policy stances did not parse, continuing without");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Policy stance generation failed, continuing without");
                Vec::new()
            }
        }
    }

    /// The image comes from the gathered pages; party and bio from the model.
    async fn profile(
        &self,
        key: &ReportKey,
        content_text: &str,
        documents: &[SourceDocument],
    ) -> PoliticianProfile {
        let mut profile = PoliticianProfile {
            image_url: documents
                .iter()
                .find_map(|d| d.image_url.clone())
                .unwrap_or_default(),
            ..PoliticianProfile::default()
        };
        let prompt = match render(TemplateId::Profile, &section_vars(key, content_text)) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Profile prompt failed to render");
                return profile;
            }
        };
        match generate_structured::<ProfileOutput>(self.provider.as_ref(), &prompt).await {
            Ok(Structured::Parsed(out)) => {
                profile.party = out.party.trim().to_string();
                profile.bio = out.bio.trim().to_string();
                debug!(party = %profile.party, bio_chars = profile.bio.len(), "Profile parsed");
            }
            Ok(Structured::Unparsed { error, .. }) => {
                warn!(error = %error, "Profile did not parse, continuing without");
            }
            Err(e) => {
                warn!(error = %e, "Profile generation failed, continuing without");
            }
        }
        profile
    }

    async fn advance(&self, run: &mut ResearchRun, state: ResearchState) -> Result<(), ResearchError> {
        debug!(from = run.state.as_str(), to = state.as_str(), "Research state transition");
        run.state = state;
        run.updated_at = Utc::now();
        self.reports.save_run(run).await?;
        Ok(())
    }

    /// Save with the state derived from the recorded sections.
    async fn save(&self, run: &mut ResearchRun) -> Result<(), ResearchError> {
        let state = run.sections.progress();
        self.advance(run, state).await
    }

    /// Persist the run as failed and build the error that carries it.
    async fn fail(&self, mut run: ResearchRun, message: String) -> ResearchError {
        error!(
            state = run.state.as_str(),
            completed = run.sections.completed().len(),
            error = %message,
            "Research run failed"
        );
        run.state = ResearchState::Failed;
        run.error = Some(message.clone());
        run.updated_at = Utc::now();
        if let Err(e) = self.reports.save_run(&run).await {
            error!(error = %e, "Could not persist failed research run");
        }
        ResearchError::Failed {
            run: Box::new(run),
            message,
        }
    }
}

fn section_vars(key: &ReportKey, content_text: &str) -> PromptVars {
    let position = if key.position.is_empty() {
        "a public office"
    } else {
        key.position.as_str()
    };
    PromptVars::new()
        .set("name", key.name.as_str())
        .set("position", position)
        .set("content_text", content_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{EmptySourceGatherer, StaticSourceGatherer};
    use crate::testing::{documents, ScriptedProvider};
    use polibrief_store::InMemoryStore;

    fn setup(provider: &Arc<ScriptedProvider>) -> (ReportAssembler, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let assembler = ReportAssembler::new(
            provider.clone(),
            Arc::new(StaticSourceGatherer::new(documents())),
            store.clone(),
        );
        (assembler, store)
    }

    fn key() -> ReportKey {
        ReportKey::new("Jane Doe", "Senator")
    }

    #[tokio::test]
    async fn full_run_persists_report() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, store) = setup(&provider);

        let report = assembler.run(&key(), false).await.unwrap();
        assert!(report.id > 0);
        assert_eq!(report.background, "background text");
        assert_eq!(report.accomplishments, "accomplishments text");
        assert_eq!(report.criticisms, "criticisms text");
        assert_eq!(report.summary, "summary text");
        assert_eq!(report.policy_stances.len(), 1);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[0].url, "https://example.com/jane-doe");
        assert_eq!(report.profile.party, "Independent");
        assert_eq!(report.profile.bio, "Jane Doe is a senator from Springfield.");
        // First gathered page that advertises an image.
        assert_eq!(report.profile.image_url, "https://news.example.org/doe.jpg");

        assert!(store.get_run(&key()).await.unwrap().is_none());
        assert_eq!(store.count_reports().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn summary_prompt_embeds_prior_sections() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, _store) = setup(&provider);
        assembler.run(&key(), false).await.unwrap();

        let prompts = provider.prompts();
        let summary = prompts
            .iter()
            .find(|p| crate::testing::kind_of(p) == "summary")
            .unwrap();
        assert!(summary.contains("BACKGROUND:\nbackground text"));
        assert!(summary.contains("ACCOMPLISHMENTS:\naccomplishments text"));
        assert!(summary.contains("CRITICISMS:\ncriticisms text"));
        assert!(summary.contains("Document 2: The senator cast the deciding vote"));
    }

    #[tokio::test]
    async fn no_sources_fails_without_generating() {
        let provider = Arc::new(ScriptedProvider::new());
        let store = Arc::new(InMemoryStore::new());
        let assembler =
            ReportAssembler::new(provider.clone(), Arc::new(EmptySourceGatherer), store.clone());

        let err = assembler.run(&key(), false).await.unwrap_err();
        assert!(err.is_no_sources());
        assert!(provider.prompts().is_empty());

        let run = store.get_run(&key()).await.unwrap().unwrap();
        assert_eq!(run.state, ResearchState::Failed);
        assert!(!run.is_resumable());
    }

    #[tokio::test]
    async fn failed_section_keeps_partial_results_and_resumes() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, store) = setup(&provider);
        provider.fail("criticisms");

        let err = assembler.run(&key(), false).await.unwrap_err();
        assert!(!err.is_no_sources());
        assert_eq!(
            err.completed_sections(),
            vec![Section::Background, Section::Accomplishments]
        );
        assert_eq!(err.run().unwrap().documents.len(), 2);
        assert_eq!(provider.calls("summary"), 0);

        let run = store.get_run(&key()).await.unwrap().unwrap();
        assert_eq!(run.state, ResearchState::Failed);
        assert!(run.error.as_deref().unwrap().contains("criticisms"));
        assert!(run.is_resumable());
        assert_eq!(store.count_reports().await.unwrap(), 0);

        provider.recover("criticisms");
        let report = assembler.run(&key(), false).await.unwrap();
        assert_eq!(report.criticisms, "criticisms text");
        // Only the missing section was generated again.
        assert_eq!(provider.calls("background"), 1);
        assert_eq!(provider.calls("accomplishments"), 1);
        // The failed attempt, then the resumed one.
        assert_eq!(provider.calls("criticisms"), 2);
        assert_eq!(provider.calls("summary"), 1);
    }

    #[tokio::test]
    async fn summary_failure_is_resumable() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, store) = setup(&provider);
        provider.fail("summary");

        let err = assembler.run(&key(), false).await.unwrap_err();
        assert_eq!(err.completed_sections().len(), 3);
        let run = store.get_run(&key()).await.unwrap().unwrap();
        assert_eq!(run.sections.progress(), ResearchState::CriticismsDone);

        provider.recover("summary");
        assembler.run(&key(), false).await.unwrap();
        assert_eq!(provider.calls("background"), 1);
    }

    #[tokio::test]
    async fn force_discards_previous_run() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, _store) = setup(&provider);
        provider.fail("criticisms");
        assert!(assembler.run(&key(), false).await.is_err());
        provider.recover("criticisms");

        assembler.run(&key(), true).await.unwrap();
        assert_eq!(provider.calls("background"), 2);
    }

    #[tokio::test]
    async fn rerun_overwrites_same_report() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, store) = setup(&provider);
        let first = assembler.run(&key(), false).await.unwrap();
        let second = assembler
            .run(&ReportKey::new("jane doe", "senator"), true)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count_reports().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stance_failure_does_not_fail_run() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, _store) = setup(&provider);
        provider.fail("stances");

        let report = assembler.run(&key(), false).await.unwrap();
        assert!(report.policy_stances.is_empty());
        assert_eq!(report.summary, "summary text");
    }

    #[tokio::test]
    async fn stances_can_be_disabled() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, _store) = setup(&provider);
        let assembler = assembler.with_options(AssemblerOptions {
            policy_stances: false,
            ..AssemblerOptions::default()
        });

        let report = assembler.run(&key(), false).await.unwrap();
        assert!(report.policy_stances.is_empty());
        assert_eq!(provider.calls("stances"), 0);
    }

    #[tokio::test]
    async fn profile_failure_keeps_image_and_report() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, store) = setup(&provider);
        provider.fail("profile");

        let report = assembler.run(&key(), false).await.unwrap();
        assert_eq!(report.summary, "summary text");
        assert_eq!(report.profile.party, "");
        assert_eq!(report.profile.bio, "");
        assert_eq!(report.profile.image_url, "https://news.example.org/doe.jpg");
        assert_eq!(provider.calls("profile"), 1);

        let stored = store.get_report(&key()).await.unwrap().unwrap();
        assert_eq!(stored.profile, report.profile);
    }

    #[tokio::test]
    async fn profile_can_be_disabled() {
        let provider = Arc::new(ScriptedProvider::new());
        let (assembler, _store) = setup(&provider);
        let assembler = assembler.with_options(AssemblerOptions {
            profile: false,
            ..AssemblerOptions::default()
        });

        let report = assembler.run(&key(), false).await.unwrap();
        assert!(report.profile.is_empty());
        assert_eq!(provider.calls("profile"), 0);
    }
}
