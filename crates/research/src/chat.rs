//! Chat Q&A scoped to a politician's research report.

use crate::parse::{generate_structured, ChatAnswerOutput, Structured};
use crate::prompts::{render, PromptVars, TemplateId};
use crate::service::{ResearchMode, ResearchService};
use chrono::{Duration, Utc};
use polibrief_core::error::{AuthError, Error, Result};
use polibrief_core::{Chat, ChatStore, NewChat, Provider, QuestionAnswer, ReportKey, ReportStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A chat with its questions and answers, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ChatWithHistory {
    pub chat: Chat,
    pub qanda: Vec<QuestionAnswer>,
}

pub struct ChatService {
    chats: Arc<dyn ChatStore>,
    reports: Arc<dyn ReportStore>,
    research: Arc<ResearchService>,
    provider: Arc<dyn Provider>,
    history_limit: usize,
    default_max_age_days: i64,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        reports: Arc<dyn ReportStore>,
        research: Arc<ResearchService>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            chats,
            reports,
            research,
            provider,
            history_limit: 5,
            default_max_age_days: 7,
        }
    }

    /// Number of earlier Q&A pairs given to the model as context.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Max age used when chat creation looks up research.
    pub fn with_default_max_age(mut self, days: i64) -> Self {
        self.default_max_age_days = days;
        self
    }

    /// Create a chat, linking the politician's report when research succeeds.
    /// A research failure still creates the chat, without a report.
    pub async fn create_chat(
        &self,
        politician: &str,
        position: &str,
        user_id: Option<i64>,
    ) -> Result<ChatWithHistory> {
        if politician.trim().is_empty() {
            return Err(Error::validation("Politician name is required"));
        }
        let key = ReportKey::new(politician, position);

        let mode = ResearchMode::Get {
            max_age_days: self.default_max_age_days,
        };
        let research_report = match self.research.research(&key, mode).await {
            Ok(outcome) => Some(outcome.report.id),
            Err(e) => {
                warn!(key = %key, error = %e, "Research unavailable, creating chat without report");
                None
            }
        };

        let chat = self
            .chats
            .create_chat(NewChat {
                politician: politician.trim().to_string(),
                position: position.trim().to_string(),
                user_id,
                research_report,
            })
            .await?;
        info!(
            chat_id = chat.id,
            temporary = chat.is_temporary(),
            has_report = research_report.is_some(),
            "Chat created"
        );
        Ok(ChatWithHistory {
            chat,
            qanda: Vec::new(),
        })
    }

    /// Answer `question` in the context of the chat's report and history.
    pub async fn ask(
        &self,
        chat_id: i64,
        question: &str,
        requester: Option<i64>,
    ) -> Result<QuestionAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::validation("Chat ID and question are required"));
        }
        let chat = self.accessible_chat(chat_id, requester).await?;

        let report_text = match chat.research_report {
            Some(id) => self
                .reports
                .get_report_by_id(id)
                .await?
                .map(|r| r.narrative()),
            None => None,
        };
        let report_text = report_text.unwrap_or_else(|| {
            format!(
                "No research report is available for {}. Answer from general knowledge only.",
                chat.politician
            )
        });

        let history = self.chats.list_qanda(chat.id).await?;
        let prompt = render(
            TemplateId::ChatAnswer,
            &PromptVars::new()
                .set("name", chat.politician.as_str())
                .set("position", display_position(&chat.position))
                .set("report", report_text)
                .set("history", format_history(&history, self.history_limit))
                .set("question", question),
        )
        .map_err(|e| Error::Internal(e.to_string()))?;
        debug!(chat_id, prompt_chars = prompt.len(), "Asking question");

        let answer = match generate_structured::<ChatAnswerOutput>(self.provider.as_ref(), &prompt)
            .await
            .map_err(Error::from)?
        {
            Structured::Parsed(out) => out.answer,
            Structured::Unparsed { raw, error } => {
                warn!(chat_id, error = %error, "Answer ignored the JSON contract, using raw text");
                raw.trim().to_string()
            }
        };
        if answer.is_empty() {
            return Err(Error::Internal("The model returned an empty answer".into()));
        }

        let qa = self.chats.add_qanda(chat.id, question, &answer).await?;
        info!(chat_id, qanda_id = qa.id, "Question answered");
        Ok(qa)
    }

    /// A chat without an owner.
    pub async fn get_temporary_chat(&self, chat_id: i64) -> Result<ChatWithHistory> {
        match self.chats.get_chat(chat_id).await? {
            Some(chat) if chat.is_temporary() => self.with_history(chat).await,
            _ => Err(Error::NotFound("Temporary chat not found".into())),
        }
    }

    /// Every chat owned by `user_id`, most recently active first.
    pub async fn list_chats(&self, user_id: i64) -> Result<Vec<ChatWithHistory>> {
        let chats = self.chats.list_chats_for_user(user_id).await?;
        let mut out = Vec::with_capacity(chats.len());
        for chat in chats {
            out.push(self.with_history(chat).await?);
        }
        Ok(out)
    }

    pub async fn list_qanda(
        &self,
        chat_id: i64,
        requester: Option<i64>,
    ) -> Result<Vec<QuestionAnswer>> {
        let chat = self.accessible_chat(chat_id, requester).await?;
        Ok(self.chats.list_qanda(chat.id).await?)
    }

    /// Delete a chat. Owned chats need their owner; temporary chats can only
    /// be deleted anonymously.
    pub async fn delete_chat(&self, chat_id: i64, requester: Option<i64>) -> Result<()> {
        let chat = self
            .chats
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;

        match (requester, chat.user_id) {
            (Some(user), owner) if owner != Some(user) => {
                return Err(Error::Forbidden("You can only delete your own chats".into()));
            }
            (None, Some(_)) => {
                return Err(Error::Auth(AuthError::Required(
                    "Authentication required to delete this chat".into(),
                )));
            }
            _ => {}
        }

        if !self.chats.delete_chat(chat_id).await? {
            return Err(Error::NotFound("Chat not found".into()));
        }
        info!(chat_id, "Chat deleted");
        Ok(())
    }

    /// Remove temporary chats older than `ttl_hours`.
    pub async fn purge_temporary(&self, ttl_hours: i64) -> Result<usize> {
        let cutoff = Duration::try_hours(ttl_hours)
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
            .ok_or_else(|| Error::validation("Chat retention window is out of range"))?;
        let purged = self.chats.purge_temporary_before(cutoff).await?;
        info!(purged, ttl_hours, "Temporary chats purged");
        Ok(purged)
    }

    async fn accessible_chat(&self, chat_id: i64, requester: Option<i64>) -> Result<Chat> {
        let chat = self
            .chats
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| Error::NotFound("Chat not found".into()))?;
        if !chat.accessible_by(requester) {
            return Err(Error::Forbidden("You do not have access to this chat".into()));
        }
        Ok(chat)
    }

    async fn with_history(&self, chat: Chat) -> Result<ChatWithHistory> {
        let qanda = self.chats.list_qanda(chat.id).await?;
        Ok(ChatWithHistory { chat, qanda })
    }
}

fn display_position(position: &str) -> &str {
    if position.trim().is_empty() {
        "politician"
    } else {
        position
    }
}

/// The most recent `limit` exchanges, oldest first.
fn format_history(history: &[QuestionAnswer], limit: usize) -> String {
    if history.is_empty() || limit == 0 {
        return "(none)".into();
    }
    let start = history.len().saturating_sub(limit);
    history[start..]
        .iter()
        .map(|qa| format!("Q: {}\nA: {}", qa.question, qa.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}
