//! Research orchestration for polibrief.
//!
//! Turns a politician's name and position into a four-section report:
//!
//! 1. [`sources`] gathers documents from the web (or a fixture set)
//! 2. [`prompts`] renders one prompt per section around the source text
//! 3. [`assembler`] drives generation as a persisted state machine, parsing
//!    each answer with [`parse`]
//! 4. [`service`] puts the cache policy from [`freshness`] and the per-key
//!    [`locks`] in front of the assembler
//!
//! [`chat`] answers follow-up questions scoped to a stored report.

pub mod assembler;
pub mod chat;
pub mod error;
pub mod freshness;
pub mod locks;
pub mod parse;
pub mod prompts;
pub mod service;
pub mod sources;

#[cfg(test)]
mod testing;

pub use assembler::{AssemblerOptions, ReportAssembler};
pub use chat::{ChatService, ChatWithHistory};
pub use error::ResearchError;
pub use freshness::{Freshness, FreshnessVerdict};
pub use locks::ResearchLocks;
pub use parse::{parse_structured, Structured};
pub use prompts::{format_sources, PromptError, PromptVars, TemplateId};
pub use service::{ResearchMode, ResearchOutcome, ResearchService};
pub use sources::{EmptySourceGatherer, StaticSourceGatherer, WebSourceGatherer};
