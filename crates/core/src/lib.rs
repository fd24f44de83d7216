//! # polibrief core
//!
//! Domain types, traits, and error definitions for the polibrief research
//! backend. This crate has **no framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Layout
//!
//! Every external seam is a trait here, with implementations in their own
//! crates:
//! - [`Provider`]: the text-generation service (`polibrief-providers`)
//! - [`SourceGatherer`]: retrieval of source documents (`polibrief-research`)
//! - [`ReportStore`], [`ChatStore`], [`UserStore`]: persistence (`polibrief-store`)

pub mod chat;
pub mod error;
pub mod provider;
pub mod report;
pub mod source;
pub mod store;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use chat::{Chat, NewChat, QuestionAnswer};
pub use error::{AuthError, Error, ProviderError, Result, StoreError};
pub use provider::{GenerationRequest, Provider};
pub use report::{
    PolicyStance, PoliticianProfile, PoliticianReport, ReportKey, ReportSections, ResearchRun,
    ResearchState, Section, SourceRef,
};
pub use source::{SourceDocument, SourceGatherer};
pub use store::{ChatStore, ReportStore, UserStore};
pub use user::{NewUser, User};
