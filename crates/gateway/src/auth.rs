//! Bearer-token extraction.
//!
//! Endpoints accept anonymous callers; an invalid or expired token is treated
//! as no token at all. Handlers that need a user check for `None` themselves.

use crate::SharedState;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use polibrief_auth::{Claims, TokenType};
use std::convert::Infallible;
use tracing::debug;

/// The authenticated caller, if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

impl MaybeUser {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|c| c.user_id)
    }
}

impl FromRequestParts<SharedState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self(None));
        };
        match state.tokens.verify(token, TokenType::Access) {
            Ok(claims) => Ok(Self(Some(claims))),
            Err(e) => {
                debug!(error = %e, "Ignoring invalid bearer token");
                Ok(Self(None))
            }
        }
    }
}

/// `Authorization: Bearer <token>`, or a bare token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?.trim();
    let token = match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if value.eq_ignore_ascii_case("bearer") => "",
        _ => value,
    };
    (!token.is_empty()).then_some(token)
}
