//! Account routes: registration, login, and token refresh.

use crate::SharedState;
use crate::error::ApiError;
use crate::extract::JsonBody;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use polibrief_auth::{TokenPair, hash_password, verify_password};
use polibrief_core::{AuthError, Error, NewUser, StoreError, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

const REQUIRED: &str = "This field is required.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";
const MAX_USERNAME_CHARS: usize = 150;
const MIN_PASSWORD_CHARS: usize = 8;
const DECOY_PASSWORD: &str = "polibrief-decoy-password";

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/token/refresh/", post(refresh))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: UserDto,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Default)]
struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    fn into_result(self) -> Result<(), ApiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(Error::fields(self.0).into())
        }
    }
}

fn validate_username(username: Option<&str>, errors: &mut FieldErrors) {
    match username.map(str::trim) {
        None | Some("") => errors.add("username", REQUIRED),
        Some(name) => {
            if name.chars().count() > MAX_USERNAME_CHARS {
                errors.add(
                    "username",
                    "Ensure this field has no more than 150 characters.",
                );
            }
            if !name
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
            {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }
    }
}

fn validate_password(password: Option<&str>, errors: &mut FieldErrors) {
    match password {
        None | Some("") => errors.add("password", REQUIRED),
        Some(pw) => {
            if pw.chars().count() < MIN_PASSWORD_CHARS {
                errors.add(
                    "password",
                    "This password is too short. It must contain at least 8 characters.",
                );
            }
            if pw.chars().all(|c| c.is_ascii_digit()) {
                errors.add("password", "This password is entirely numeric.");
            }
        }
    }
}

/// Hashing is CPU-bound, so it runs off the async workers.
async fn hash_blocking(password: String, iterations: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| Error::Internal(format!("hashing task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn verify_blocking(password: String, stored: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| Error::Internal(format!("hashing task failed: {e}")).into())
}

async fn decoy_hash(state: &SharedState) -> Result<String, ApiError> {
    state
        .decoy_hash
        .get_or_try_init(|| hash_blocking(DECOY_PASSWORD.to_string(), state.password_iterations))
        .await
        .cloned()
}

async fn register(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = FieldErrors::default();
    validate_username(req.username.as_deref(), &mut errors);
    validate_password(req.password.as_deref(), &mut errors);
    errors.into_result()?;

    let username = req.username.unwrap_or_default().trim().to_string();
    if state.users.get_user_by_username(&username).await?.is_some() {
        return Err(Error::field("username", USERNAME_TAKEN).into());
    }

    let password_hash =
        hash_blocking(req.password.unwrap_or_default(), state.password_iterations).await?;
    let user = state
        .users
        .create_user(NewUser {
            username,
            first_name: req.first_name.unwrap_or_default(),
            last_name: req.last_name.unwrap_or_default(),
            password_hash,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => Error::field("username", USERNAME_TAKEN),
            other => Error::Store(other),
        })?;

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            user: UserDto::from(&user),
            tokens,
        }),
    ))
}

async fn login(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut errors = FieldErrors::default();
    if req.username.as_deref().is_none_or(|u| u.trim().is_empty()) {
        errors.add("username", REQUIRED);
    }
    if req.password.as_deref().is_none_or(str::is_empty) {
        errors.add("password", REQUIRED);
    }
    errors.into_result()?;

    let username = req.username.unwrap_or_default();
    let user = state.users.get_user_by_username(username.trim()).await?;
    // Unknown usernames still pay for one verification.
    let stored = match &user {
        Some(user) => user.password_hash.clone(),
        None => decoy_hash(&state).await?,
    };
    let verified = verify_blocking(req.password.unwrap_or_default(), stored).await?;
    let Some(user) = user.filter(|_| verified) else {
        return Err(AuthError::InvalidCredentials.into());
    };

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = user.id, "User logged in");
    Ok(Json(AuthResponse {
        message: "Login successful",
        user: UserDto::from(&user),
        tokens,
    }))
}

async fn refresh(
    State(state): State<SharedState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let Some(token) = req.refresh.filter(|t| !t.trim().is_empty()) else {
        return Err(Error::field("refresh", REQUIRED).into());
    };
    let access = state.tokens.refresh(token.trim())?;
    Ok(Json(RefreshResponse { access }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn register_returns_user_and_tokens() {
        let app = TestApp::new();
        let (status, body) = app
            .post(
                "/accounts/register/",
                json!({
                    "username": "jdoe",
                    "password": "s3cure-pass",
                    "first_name": "Jane",
                    "last_name": "Doe"
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User registered successfully");
        assert_eq!(body["user"]["username"], "jdoe");
        assert_eq!(body["user"]["first_name"], "Jane");
        assert!(body["user"].get("password_hash").is_none());
        assert!(body["tokens"]["access"].is_string());
        assert!(body["tokens"]["refresh"].is_string());
    }

    #[tokio::test]
    async fn register_validation_errors() {
        let app = TestApp::new();
        let (status, body) = app
            .post("/accounts/register/", json!({ "password": "12345678" }), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["username"][0], "This field is required.");
        assert_eq!(body["password"][0], "This password is entirely numeric.");

        let (status, body) = app
            .post(
                "/accounts/register/",
                json!({ "username": "jdoe", "password": "short" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["password"][0].as_str().unwrap().contains("too short"));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let app = TestApp::new();
        app.register("jdoe").await;
        let (status, body) = app
            .post(
                "/accounts/register/",
                json!({ "username": "jdoe", "password": "another-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["username"][0], "A user with that username already exists.");
    }

    #[tokio::test]
    async fn login_flow() {
        let app = TestApp::new();
        app.register("jdoe").await;

        let (status, body) = app
            .post(
                "/accounts/login/",
                json!({ "username": "jdoe", "password": "s3cure-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");

        let (status, body) = app
            .post(
                "/accounts/login/",
                json!({ "username": "jdoe", "password": "wrong-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");

        let (status, body) = app
            .post("/accounts/login/", json!({ "username": "jdoe" }), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["password"][0], "This field is required.");
    }

    #[tokio::test]
    async fn unknown_username_is_checked_against_decoy_hash() {
        let app = TestApp::new();
        let (status, body) = app
            .post(
                "/accounts/login/",
                json!({ "username": "ghost", "password": "s3cure-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid credentials");
        let decoy = app.state.decoy_hash.get().expect("decoy hash computed");
        assert!(decoy.starts_with("pbkdf2_sha256$1000$"));

        // Same response as a wrong password for a real account.
        app.register("jdoe").await;
        let (status, wrong) = app
            .post(
                "/accounts/login/",
                json!({ "username": "jdoe", "password": "wrong-pass" }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, body);
    }

    #[tokio::test]
    async fn refresh_flow() {
        let app = TestApp::new();
        let (_, body) = app
            .post(
                "/accounts/register/",
                json!({ "username": "jdoe", "password": "s3cure-pass" }),
                None,
            )
            .await;
        let refresh = body["tokens"]["refresh"].as_str().unwrap();
        let access = body["tokens"]["access"].as_str().unwrap();

        let (status, body) = app
            .post("/accounts/token/refresh/", json!({ "refresh": refresh }), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access"].is_string());

        // An access token is not a refresh token.
        let (status, body) = app
            .post("/accounts/token/refresh/", json!({ "refresh": access }), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Token is invalid or expired");
    }
}
