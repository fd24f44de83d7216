//! Router harness for handler tests.

use crate::{AppState, SharedState, build_router};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use polibrief_config::AppConfig;
use polibrief_core::{
    GenerationRequest, Provider, ProviderError, SourceDocument, SourceGatherer,
};
use polibrief_research::{EmptySourceGatherer, StaticSourceGatherer};
use polibrief_store::InMemoryStore;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Answers every prompt with a fixed JSON object for its template.
pub struct ScriptedProvider;

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let p = &request.prompt;
        let out = if p.contains("identify the stated or demonstrated positions") {
            r#"{"stances": [{"issue": "Housing", "stance": "Supports zoning reform"}]}"#.into()
        } else if p.contains("give the party affiliation and a short biography") {
            r#"{"party": "Independent", "bio": "Jane Doe is a senator."}"#.into()
        } else if p.contains("answering questions about") {
            r#"{"answer": "A scripted answer."}"#.into()
        } else if p.contains("balanced summary judgment") {
            r#"{"content": "summary text"}"#.into()
        } else if p.contains("write the background of") {
            r#"{"content": "background text"}"#.into()
        } else if p.contains("list the accomplishments of") {
            r#"{"content": "accomplishments text"}"#.into()
        } else {
            r#"{"content": "criticisms text"}"#.into()
        };
        Ok(out)
    }
}

pub fn documents() -> Vec<SourceDocument> {
    vec![SourceDocument {
        url: "https://example.com/jane-doe".into(),
        title: "Jane Doe profile".into(),
        query: "Jane Doe Senator".into(),
        content: "Jane Doe is a senator who chairs the finance committee.".into(),
        image_url: Some("https://example.com/jane-doe.jpg".into()),
    }]
}

pub struct TestApp {
    pub router: Router,
    pub state: SharedState,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(|_| {}, Arc::new(StaticSourceGatherer::new(documents())))
    }

    pub fn with_config(tweak: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(tweak, Arc::new(StaticSourceGatherer::new(documents())))
    }

    pub fn without_sources() -> Self {
        Self::build(|_| {}, Arc::new(EmptySourceGatherer))
    }

    fn build(tweak: impl FnOnce(&mut AppConfig), gatherer: Arc<dyn SourceGatherer>) -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some("test-secret".into());
        config.gateway.rate_limit_per_minute = 0;
        tweak(&mut config);

        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(&config, store.clone(), Arc::new(ScriptedProvider), gatherer)
            .unwrap()
            .with_password_iterations(1_000);
        let state = Arc::new(state);
        Self {
            router: build_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call("GET", uri, None, token).await
    }

    pub async fn post(&self, uri: &str, body: Value, token: Option<&str>) -> (StatusCode, Value) {
        self.call("POST", uri, Some(body), token).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call("DELETE", uri, None, token).await
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        send(&self.router, req).await
    }

    /// Register `username` and return its access token and user id.
    pub async fn register(&self, username: &str) -> (String, i64) {
        let (status, body) = self
            .post(
                "/accounts/register/",
                serde_json::json!({ "username": username, "password": "s3cure-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["tokens"]["access"].as_str().unwrap().to_string(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }
}

/// Send one request and decode the body as JSON (`Null` when empty).
pub async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
