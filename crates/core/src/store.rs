//! Persistence traits.
//!
//! Implementations: SQLite (production) and in-memory (tests, ephemeral runs).

use crate::chat::{Chat, NewChat, QuestionAnswer};
use crate::error::StoreError;
use crate::report::{PoliticianReport, ReportKey, ResearchRun};
use crate::user::{NewUser, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Completed reports plus the in-progress run state of the assembler.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn get_report(&self, key: &ReportKey) -> StoreResult<Option<PoliticianReport>>;

    async fn get_report_by_id(&self, id: i64) -> StoreResult<Option<PoliticianReport>>;

    /// Insert or replace the report for its key, keeping the original
    /// `created_at` and id on replace. Returns the stored report.
    async fn upsert_report(&self, report: PoliticianReport) -> StoreResult<PoliticianReport>;

    async fn get_run(&self, key: &ReportKey) -> StoreResult<Option<ResearchRun>>;

    async fn save_run(&self, run: &ResearchRun) -> StoreResult<()>;

    async fn clear_run(&self, key: &ReportKey) -> StoreResult<()>;

    async fn count_reports(&self) -> StoreResult<usize>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, chat: NewChat) -> StoreResult<Chat>;

    async fn get_chat(&self, id: i64) -> StoreResult<Option<Chat>>;

    /// Chats owned by `user_id`, most recently updated first.
    async fn list_chats_for_user(&self, user_id: i64) -> StoreResult<Vec<Chat>>;

    /// Delete a chat and its history. Returns whether it existed.
    async fn delete_chat(&self, id: i64) -> StoreResult<bool>;

    /// Append a question/answer pair and bump the chat's `updated_at`.
    async fn add_qanda(&self, chat_id: i64, question: &str, answer: &str)
        -> StoreResult<QuestionAnswer>;

    /// History of a chat, oldest first.
    async fn list_qanda(&self, chat_id: i64) -> StoreResult<Vec<QuestionAnswer>>;

    /// Delete temporary chats created before `cutoff`. Returns how many went.
    async fn purge_temporary_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the username is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    /// Case-sensitive lookup.
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;
}
