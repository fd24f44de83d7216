//! Research error taxonomy.

use crate::prompts::PromptError;
use polibrief_core::{ProviderError, ReportKey, ResearchRun, Section, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Could not parse model output: {0}")]
    Parse(String),

    #[error("Generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No content found for {key}")]
    NoSources { key: ReportKey },

    /// The run stopped before finishing; `run` holds whatever completed.
    #[error("Research for {} failed: {message}", .run.key)]
    Failed {
        run: Box<ResearchRun>,
        message: String,
    },

    #[error(transparent)]
    Core(#[from] polibrief_core::Error),
}

impl ResearchError {
    /// The persisted run behind a failure, when there is one.
    pub fn run(&self) -> Option<&ResearchRun> {
        match self {
            Self::Failed { run, .. } => Some(run),
            _ => None,
        }
    }

    /// Sections finished before the failure.
    pub fn completed_sections(&self) -> Vec<Section> {
        self.run()
            .map(|r| r.sections.completed())
            .unwrap_or_default()
    }

    /// Whether the failure happened because nothing could be gathered.
    pub fn is_no_sources(&self) -> bool {
        match self {
            Self::NoSources { .. } => true,
            Self::Failed { run, .. } => run.documents.is_empty(),
            _ => false,
        }
    }
}

impl From<ResearchError> for polibrief_core::Error {
    fn from(err: ResearchError) -> Self {
        match err {
            ResearchError::Provider(e) => polibrief_core::Error::Provider(e),
            ResearchError::Store(e) => polibrief_core::Error::Store(e),
            ResearchError::Core(e) => e,
            other => polibrief_core::Error::Internal(other.to_string()),
        }
    }
}
