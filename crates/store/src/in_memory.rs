//! In-memory store, useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polibrief_core::error::StoreError;
use polibrief_core::{
    Chat, ChatStore, NewChat, NewUser, PoliticianReport, QuestionAnswer, ReportKey, ReportStore,
    ResearchRun, User, UserStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type StoreResult<T> = Result<T, StoreError>;

#[derive(Default)]
struct State {
    next_id: i64,
    reports: HashMap<ReportKey, PoliticianReport>,
    runs: HashMap<ReportKey, ResearchRun>,
    chats: HashMap<i64, Chat>,
    qanda: Vec<QuestionAnswer>,
    users: HashMap<i64, User>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn get_report(&self, key: &ReportKey) -> StoreResult<Option<PoliticianReport>> {
        Ok(self.state.read().await.reports.get(key).cloned())
    }

    async fn get_report_by_id(&self, id: i64) -> StoreResult<Option<PoliticianReport>> {
        let state = self.state.read().await;
        Ok(state.reports.values().find(|r| r.id == id).cloned())
    }

    async fn upsert_report(&self, mut report: PoliticianReport) -> StoreResult<PoliticianReport> {
        let mut state = self.state.write().await;
        let key = report.key();
        match state.reports.get(&key) {
            Some(existing) => {
                report.id = existing.id;
                report.created_at = existing.created_at;
                report.name = existing.name.clone();
                report.position = existing.position.clone();
            }
            None => {
                report.id = state.next_id();
                report.name = key.name.clone();
                report.position = key.position.clone();
            }
        }
        state.reports.insert(key, report.clone());
        Ok(report)
    }

    async fn get_run(&self, key: &ReportKey) -> StoreResult<Option<ResearchRun>> {
        Ok(self.state.read().await.runs.get(key).cloned())
    }

    async fn save_run(&self, run: &ResearchRun) -> StoreResult<()> {
        self.state
            .write()
            .await
            .runs
            .insert(run.key.clone(), run.clone());
        Ok(())
    }

    async fn clear_run(&self, key: &ReportKey) -> StoreResult<()> {
        self.state.write().await.runs.remove(key);
        Ok(())
    }

    async fn count_reports(&self) -> StoreResult<usize> {
        Ok(self.state.read().await.reports.len())
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn create_chat(&self, chat: NewChat) -> StoreResult<Chat> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let chat = Chat {
            id: state.next_id(),
            politician: chat.politician,
            position: chat.position,
            user_id: chat.user_id,
            research_report: chat.research_report,
            created_at: now,
            updated_at: now,
        };
        state.chats.insert(chat.id, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, id: i64) -> StoreResult<Option<Chat>> {
        Ok(self.state.read().await.chats.get(&id).cloned())
    }

    async fn list_chats_for_user(&self, user_id: i64) -> StoreResult<Vec<Chat>> {
        let state = self.state.read().await;
        let mut chats: Vec<Chat> = state
            .chats
            .values()
            .filter(|c| c.user_id == Some(user_id))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(chats)
    }

    async fn delete_chat(&self, id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let existed = state.chats.remove(&id).is_some();
        state.qanda.retain(|q| q.chat != id);
        Ok(existed)
    }

    async fn add_qanda(
        &self,
        chat_id: i64,
        question: &str,
        answer: &str,
    ) -> StoreResult<QuestionAnswer> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let id = state.next_id();
        let chat = state
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| StoreError::QueryFailed(format!("chat {chat_id} does not exist")))?;
        chat.updated_at = now;

        let qa = QuestionAnswer {
            id,
            chat: chat_id,
            question: question.into(),
            answer: answer.into(),
            created_at: now,
        };
        state.qanda.push(qa.clone());
        Ok(qa)
    }

    async fn list_qanda(&self, chat_id: i64) -> StoreResult<Vec<QuestionAnswer>> {
        let state = self.state.read().await;
        Ok(state
            .qanda
            .iter()
            .filter(|q| q.chat == chat_id)
            .cloned()
            .collect())
    }

    async fn purge_temporary_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let doomed: Vec<i64> = state
            .chats
            .values()
            .filter(|c| c.is_temporary() && c.created_at < cutoff)
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            state.chats.remove(id);
        }
        state.qanda.retain(|q| !doomed.contains(&q.chat));
        Ok(doomed.len())
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "username '{}' is taken",
                user.username
            )));
        }
        let user = User {
            id: state.next_id(),
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}
