//! Research routes.
//!
//! `GET /api/research/{name}/` serves a cached report when it is fresh
//! enough; `POST` always re-runs research.

use crate::SharedState;
use crate::extract::{ApiPath, ApiQuery};
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use polibrief_core::{PolicyStance, PoliticianReport, ReportKey, SourceRef};
use polibrief_research::{Freshness, ResearchError, ResearchMode};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, warn};

pub fn router() -> Router<SharedState> {
    Router::new().route("/{name}/", get(research_handler).post(research_handler))
}

/// Parsed query string.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchQuery {
    pub position: String,
    pub max_age_days: Option<i64>,
    pub include_sources: bool,
    pub detailed: bool,
}

impl ResearchQuery {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, String> {
        let max_age_days = match params.get("max_age").map(|v| v.trim()) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<i64>() {
                Ok(days) if days >= 0 => Some(days),
                _ => return Err("max_age must be a non-negative integer".to_string()),
            },
        };
        Ok(Self {
            position: params.get("position").cloned().unwrap_or_default(),
            max_age_days,
            include_sources: flag(params, "include_sources"),
            detailed: flag(params, "detailed"),
        })
    }
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Who the report is about. Profile fields are empty strings when unknown.
#[derive(Debug, Serialize)]
pub struct PoliticianRef {
    pub name: String,
    pub position: String,
    pub party: String,
    pub bio: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    pub is_fresh: bool,
    pub age_days: i64,
    pub request_method: &'static str,
}

/// Report as returned by the research endpoint.
#[derive(Debug, Serialize)]
pub struct ReportBody {
    pub id: i64,
    pub politician: PoliticianRef,
    pub background: String,
    pub accomplishments: String,
    pub criticisms: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_stances: Option<Vec<PolicyStance>>,
    pub metadata: ReportMetadata,
}

impl ReportBody {
    fn build(report: PoliticianReport, query: &ResearchQuery, metadata: ReportMetadata) -> Self {
        Self {
            id: report.id,
            politician: PoliticianRef {
                name: report.name,
                position: report.position,
                party: report.profile.party,
                bio: report.profile.bio,
                image_url: report.profile.image_url,
            },
            background: report.background,
            accomplishments: report.accomplishments,
            criticisms: report.criticisms,
            summary: report.summary,
            created_at: report.created_at,
            updated_at: report.updated_at,
            sources: query.include_sources.then_some(report.sources),
            policy_stances: query.detailed.then_some(report.policy_stances),
            metadata,
        }
    }
}

fn validation_failure(message: &str, name: &str, position: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": message,
            "name": name,
            "position": position,
        })),
    )
        .into_response()
}

fn research_failure(err: &ResearchError, name: &str, position: &str) -> Response {
    let status = if err.is_no_sources() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let content_list: Vec<_> = err
        .run()
        .map(|run| {
            run.documents
                .iter()
                .map(|d| json!({ "url": d.url, "title": d.title }))
                .collect()
        })
        .unwrap_or_default();
    let completed: Vec<&str> = err
        .completed_sections()
        .into_iter()
        .map(|s| s.as_str())
        .collect();

    if status.is_server_error() {
        error!(name, position, error = %err, "Research failed");
    } else {
        warn!(name, position, error = %err, "Research found no sources");
    }
    (
        status,
        Json(json!({
            "success": false,
            "error": err.to_string(),
            "name": name,
            "position": position,
            "content_list": content_list,
            "completed_sections": completed,
        })),
    )
        .into_response()
}

async fn research_handler(
    State(state): State<SharedState>,
    method: Method,
    ApiPath(name): ApiPath<String>,
    ApiQuery(params): ApiQuery<HashMap<String, String>>,
) -> Response {
    let position = params.get("position").cloned().unwrap_or_default();
    let query = match ResearchQuery::parse(&params) {
        Ok(q) => q,
        Err(message) => return validation_failure(&message, &name, &position),
    };
    if name.trim().is_empty() {
        return validation_failure("Politician name is required", &name, &position);
    }

    let max_age_days = query.max_age_days.unwrap_or(state.default_max_age_days);
    let mode = if method == Method::POST {
        ResearchMode::Force
    } else {
        ResearchMode::Get { max_age_days }
    };
    let key = ReportKey::new(&name, &query.position);

    match state.research.research(&key, mode).await {
        Ok(outcome) => {
            let verdict =
                Freshness::evaluate(outcome.report.updated_at, max_age_days, Utc::now());
            let metadata = ReportMetadata {
                is_fresh: verdict.is_fresh,
                age_days: verdict.age_days,
                request_method: mode.request_method(),
            };
            Json(ReportBody::build(outcome.report, &query, metadata)).into_response()
        }
        Err(e) => research_failure(&e, &name, &query.position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use chrono::Duration;
    use polibrief_core::ReportStore;
    use serde_json::Value;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_defaults_and_flags() {
        let q = ResearchQuery::parse(&params(&[])).unwrap();
        assert_eq!(q.position, "");
        assert_eq!(q.max_age_days, None);
        assert!(!q.include_sources && !q.detailed);

        let q = ResearchQuery::parse(&params(&[
            ("position", "Senator"),
            ("max_age", "0"),
            ("include_sources", "TRUE"),
            ("detailed", "yes"),
        ]))
        .unwrap();
        assert_eq!(q.position, "Senator");
        assert_eq!(q.max_age_days, Some(0));
        assert!(q.include_sources);
        assert!(!q.detailed);
    }

    #[test]
    fn query_rejects_bad_max_age() {
        assert!(ResearchQuery::parse(&params(&[("max_age", "-1")])).is_err());
        assert!(ResearchQuery::parse(&params(&[("max_age", "week")])).is_err());
    }

    #[tokio::test]
    async fn get_assembles_then_serves_cache() {
        let app = TestApp::new();
        let (status, body) = app
            .get("/api/research/Jane%20Doe/?position=Senator", None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["politician"]["name"], "Jane Doe");
        assert_eq!(body["politician"]["position"], "Senator");
        assert_eq!(body["politician"]["party"], "Independent");
        assert_eq!(body["politician"]["bio"], "Jane Doe is a senator.");
        assert_eq!(body["politician"]["image_url"], "https://example.com/jane-doe.jpg");
        assert_eq!(body["background"], "background text");
        assert_eq!(body["summary"], "summary text");
        assert_eq!(body["metadata"]["request_method"], "GET");
        assert_eq!(body["metadata"]["is_fresh"], true);
        assert_eq!(body["metadata"]["age_days"], 0);
        assert!(body.get("sources").is_none());
        assert!(body.get("policy_stances").is_none());

        let (_, again) = app
            .get("/api/research/jane%20doe/?position=senator", None)
            .await;
        assert_eq!(again["id"], body["id"]);
        assert_eq!(again["updated_at"], body["updated_at"]);
    }

    #[tokio::test]
    async fn optional_sections_on_request() {
        let app = TestApp::new();
        let (status, body) = app
            .get(
                "/api/research/Jane%20Doe/?include_sources=true&detailed=true",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"][0]["url"], "https://example.com/jane-doe");
        assert_eq!(body["policy_stances"][0]["issue"], "Housing");
    }

    #[tokio::test]
    async fn post_forces_new_research() {
        let app = TestApp::new();
        let (_, first) = app.get("/api/research/Jane%20Doe/", None).await;

        let mut report = app
            .store
            .get_report(&ReportKey::new("Jane Doe", ""))
            .await
            .unwrap()
            .unwrap();
        report.updated_at = Utc::now() - Duration::days(2);
        app.store.upsert_report(report).await.unwrap();

        let (status, forced) = app
            .post("/api/research/Jane%20Doe/", Value::Null, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(forced["id"], first["id"]);
        assert_eq!(forced["metadata"]["request_method"], "POST");
        assert_eq!(forced["metadata"]["age_days"], 0);
    }

    #[tokio::test]
    async fn stale_report_reports_age() {
        let app = TestApp::new();
        app.get("/api/research/Jane%20Doe/", None).await;

        let mut report = app
            .store
            .get_report(&ReportKey::new("Jane Doe", ""))
            .await
            .unwrap()
            .unwrap();
        report.updated_at = Utc::now() - Duration::days(3);
        app.store.upsert_report(report).await.unwrap();

        let (_, cached) = app.get("/api/research/Jane%20Doe/?max_age=5", None).await;
        assert_eq!(cached["metadata"]["age_days"], 3);
        assert_eq!(cached["metadata"]["is_fresh"], true);
    }

    #[tokio::test]
    async fn invalid_max_age_is_rejected() {
        let app = TestApp::new();
        let (status, body) = app
            .get("/api/research/Jane%20Doe/?max_age=-3&position=Mayor", None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["name"], "Jane Doe");
        assert_eq!(body["position"], "Mayor");
    }

    #[tokio::test]
    async fn max_age_at_integer_limit_is_served() {
        let app = TestApp::new();
        let uri = "/api/research/Jane%20Doe/?position=Senator&max_age=9223372036854775807";
        let (status, first) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::OK, "{first}");
        assert_eq!(first["metadata"]["is_fresh"], true);

        let (status, cached) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cached["updated_at"], first["updated_at"]);
    }

    #[tokio::test]
    async fn no_sources_is_a_bad_request() {
        let app = TestApp::without_sources();
        let (status, body) = app.get("/api/research/Jane%20Doe/", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["content_list"], serde_json::json!([]));
        assert_eq!(body["completed_sections"], serde_json::json!([]));
    }
}
