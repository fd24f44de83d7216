//! Chat routes.
//!
//! Chats created without a bearer token are temporary: anyone holding the id
//! can read, question, or delete them.

use crate::SharedState;
use crate::auth::MaybeUser;
use crate::error::ApiError;
use crate::extract::{ApiPath, JsonBody};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use polibrief_core::{AuthError, Error, QuestionAnswer};
use polibrief_research::ChatWithHistory;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const QUESTION_REQUIRED: &str = "Chat ID and question are required";

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/chats/", post(create_chat).get(list_chats))
        .route("/chats/{chat_id}/", delete(delete_chat))
        .route("/chats/{chat_id}/qanda/", get(list_qanda))
        .route("/temporary-chats/{chat_id}/", get(get_temporary_chat))
        .route("/questions/", post(ask_question))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateChatRequest {
    pub politician: Option<String>,
    pub position: Option<String>,
}

/// `chat_id` arrives as a number or a numeric string.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuestionRequest {
    pub chat_id: Option<Value>,
    pub question: Option<String>,
}

impl QuestionRequest {
    fn chat_id(&self) -> Option<i64> {
        let id = match self.chat_id.as_ref()? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (id > 0).then_some(id)
    }
}

/// Chat as returned by the API, with its Q&A inline.
#[derive(Debug, Serialize)]
pub struct ChatBody {
    pub id: i64,
    pub politician: String,
    pub position: String,
    pub user: Option<i64>,
    pub research_report: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub qanda_set: Vec<QuestionAnswer>,
}

impl From<ChatWithHistory> for ChatBody {
    fn from(c: ChatWithHistory) -> Self {
        Self {
            id: c.chat.id,
            politician: c.chat.politician,
            position: c.chat.position,
            user: c.chat.user_id,
            research_report: c.chat.research_report,
            created_at: c.chat.created_at,
            updated_at: c.chat.updated_at,
            qanda_set: c.qanda,
        }
    }
}

async fn create_chat(
    State(state): State<SharedState>,
    user: MaybeUser,
    JsonBody(req): JsonBody<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatBody>), ApiError> {
    let chat = state
        .chats
        .create_chat(
            req.politician.as_deref().unwrap_or_default(),
            req.position.as_deref().unwrap_or_default(),
            user.user_id(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(chat.into())))
}

async fn list_chats(
    State(state): State<SharedState>,
    user: MaybeUser,
) -> Result<Json<Vec<ChatBody>>, ApiError> {
    let Some(user_id) = user.user_id() else {
        return Err(AuthError::Required("Authentication required to view chats".into()).into());
    };
    let chats = state.chats.list_chats(user_id).await?;
    Ok(Json(chats.into_iter().map(ChatBody::from).collect()))
}

async fn delete_chat(
    State(state): State<SharedState>,
    user: MaybeUser,
    ApiPath(chat_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.chats.delete_chat(chat_id, user.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_qanda(
    State(state): State<SharedState>,
    user: MaybeUser,
    ApiPath(chat_id): ApiPath<i64>,
) -> Result<Json<Vec<QuestionAnswer>>, ApiError> {
    Ok(Json(state.chats.list_qanda(chat_id, user.user_id()).await?))
}

async fn get_temporary_chat(
    State(state): State<SharedState>,
    ApiPath(chat_id): ApiPath<i64>,
) -> Result<Json<ChatBody>, ApiError> {
    Ok(Json(state.chats.get_temporary_chat(chat_id).await?.into()))
}

async fn ask_question(
    State(state): State<SharedState>,
    user: MaybeUser,
    JsonBody(req): JsonBody<QuestionRequest>,
) -> Result<(StatusCode, Json<QuestionAnswer>), ApiError> {
    let question = req.question.as_deref().unwrap_or_default();
    let Some(chat_id) = req.chat_id() else {
        return Err(Error::validation(QUESTION_REQUIRED).into());
    };
    if question.trim().is_empty() {
        return Err(Error::validation(QUESTION_REQUIRED).into());
    }
    let qa = state.chats.ask(chat_id, question, user.user_id()).await?;
    Ok((StatusCode::CREATED, Json(qa)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use serde_json::json;

    #[test]
    fn chat_id_accepts_numbers_and_strings() {
        let req = |v: Value| QuestionRequest {
            chat_id: Some(v),
            question: None,
        };
        assert_eq!(req(json!(4)).chat_id(), Some(4));
        assert_eq!(req(json!(" 12 ")).chat_id(), Some(12));
        assert_eq!(req(json!(0)).chat_id(), None);
        assert_eq!(req(json!("abc")).chat_id(), None);
        assert_eq!(req(json!(null)).chat_id(), None);
    }

    #[tokio::test]
    async fn anonymous_chat_is_temporary() {
        let app = TestApp::new();
        let (status, body) = app
            .post("/api/chat/chats/", json!({ "politician": "Jane Doe" }), None)
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["user"], Value::Null);
        assert_eq!(body["qanda_set"], json!([]));
        assert_eq!(body["politician"], "Jane Doe");
        assert!(body["research_report"].is_i64());

        let id = body["id"].as_i64().unwrap();
        let (status, fetched) = app
            .get(&format!("/api/chat/temporary-chats/{id}/"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["id"], id);
    }

    #[tokio::test]
    async fn missing_politician_is_rejected() {
        let app = TestApp::new();
        let (status, body) = app
            .post("/api/chat/chats/", json!({ "position": "Mayor" }), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Politician name is required");
    }

    #[tokio::test]
    async fn chat_without_sources_has_no_report() {
        let app = TestApp::without_sources();
        let (status, body) = app
            .post("/api/chat/chats/", json!({ "politician": "Jane Doe" }), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["research_report"], Value::Null);
    }

    #[tokio::test]
    async fn question_on_unknown_chat() {
        let app = TestApp::new();
        let (status, body) = app
            .post(
                "/api/chat/questions/",
                json!({ "chat_id": 999, "question": "x" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Chat not found" }));
    }

    #[tokio::test]
    async fn question_requires_fields() {
        let app = TestApp::new();
        let (status, body) = app
            .post("/api/chat/questions/", json!({ "question": "x" }), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Chat ID and question are required");

        let (status, _) = app
            .post("/api/chat/questions/", json!({ "chat_id": 1, "question": "  " }), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ask_and_list_history() {
        let app = TestApp::new();
        let (_, chat) = app
            .post("/api/chat/chats/", json!({ "politician": "Jane Doe" }), None)
            .await;
        let id = chat["id"].as_i64().unwrap();

        let (status, qa) = app
            .post(
                "/api/chat/questions/",
                json!({ "chat_id": id.to_string(), "question": "What committees?" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{qa}");
        assert_eq!(qa["chat"], id);
        assert_eq!(qa["answer"], "A scripted answer.");

        let (status, list) = app
            .get(&format!("/api/chat/chats/{id}/qanda/"), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["question"], "What committees?");
    }

    #[tokio::test]
    async fn owned_chats_are_private() {
        let app = TestApp::new();
        let (alice, alice_id) = app.register("alice").await;
        let (bob, _) = app.register("bob").await;

        let (_, chat) = app
            .post(
                "/api/chat/chats/",
                json!({ "politician": "Jane Doe", "position": "Senator" }),
                Some(&alice),
            )
            .await;
        assert_eq!(chat["user"], alice_id);
        let id = chat["id"].as_i64().unwrap();

        let (status, list) = app.get("/api/chat/chats/", Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["id"], id);

        let (status, _) = app
            .get(&format!("/api/chat/temporary-chats/{id}/"), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .post(
                "/api/chat/questions/",
                json!({ "chat_id": id, "question": "Hi?" }),
                Some(&bob),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.get("/api/chat/chats/", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required to view chats");
    }

    #[tokio::test]
    async fn delete_rules() {
        let app = TestApp::new();
        let (alice, _) = app.register("alice").await;
        let (bob, _) = app.register("bob").await;

        let (_, owned) = app
            .post("/api/chat/chats/", json!({ "politician": "Jane Doe" }), Some(&alice))
            .await;
        let owned = owned["id"].as_i64().unwrap();
        let uri = format!("/api/chat/chats/{owned}/");

        let (status, body) = app.delete(&uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required to delete this chat");

        let (status, body) = app.delete(&uri, Some(&bob)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "You can only delete your own chats");

        let (status, body) = app.delete(&uri, Some(&alice)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = app.delete(&uri, Some(&alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Chat not found");

        let (_, temp) = app
            .post("/api/chat/chats/", json!({ "politician": "Jane Doe" }), None)
            .await;
        let (status, _) = app
            .delete(&format!("/api/chat/chats/{}/", temp["id"]), None)
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
