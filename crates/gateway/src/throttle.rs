//! Per-client request throttling.
//!
//! Signed-in callers are counted by user id, everyone else by peer IP. The
//! peer comes from `ConnectInfo`, so the server must be started with
//! `into_make_service_with_connect_info`. Each client gets a fixed window of
//! `limit` requests; `/health` is never counted.

use crate::auth::bearer_token;
use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use polibrief_auth::{TokenSigner, TokenType};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Buckets kept before idle ones are swept.
const SWEEP_THRESHOLD: usize = 4_096;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientKey {
    User(i64),
    Peer(IpAddr),
    /// No verified token and no peer address.
    Unknown,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Peer(ip) => write!(f, "ip:{ip}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl ClientKey {
    /// A forged or expired token does not earn its own bucket.
    pub fn of(req: &Request, tokens: &TokenSigner) -> Self {
        if let Some(claims) =
            bearer_token(req.headers()).and_then(|t| tokens.verify(t, TokenType::Access).ok())
        {
            return Self::User(claims.user_id);
        }
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(Self::Unknown, |ConnectInfo(addr)| Self::Peer(addr.ip()))
    }
}

struct Window {
    opened: Instant,
    used: u32,
}

/// Fixed-window request counter per client.
pub struct Throttle {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<ClientKey, Window>>,
}

impl Throttle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Count one request; `false` once the client's window is used up.
    pub fn admit(&self, key: &ClientKey) -> bool {
        self.admit_at(key, Instant::now())
    }

    fn admit_at(&self, key: &ClientKey, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.opened) < self.window);
        }

        let window = windows.entry(key.clone()).or_insert(Window {
            opened: now,
            used: 0,
        });
        if now.duration_since(window.opened) >= self.window {
            window.opened = now;
            window.used = 0;
        }
        if window.used >= self.limit {
            return false;
        }
        window.used += 1;
        true
    }
}

pub async fn throttle_middleware(
    throttle: Arc<Throttle>,
    tokens: TokenSigner,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }
    let client = ClientKey::of(&req, &tokens);
    if !throttle.admit(&client) {
        warn!(%client, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestApp, send};
    use axum::body::Body;

    fn from_peer(ip: [u8; 4], token: Option<&str>) -> Request {
        let mut req = Request::builder().uri("/api/chat/temporary-chats/1/");
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        let mut req = req.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40_000))));
        req
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let throttle = Throttle::new(2, Duration::from_secs(60));
        let key = ClientKey::Peer([10, 0, 0, 1].into());
        let start = Instant::now();
        assert!(throttle.admit_at(&key, start));
        assert!(throttle.admit_at(&key, start));
        assert!(!throttle.admit_at(&key, start + Duration::from_secs(59)));
        assert!(throttle.admit_at(&key, start + Duration::from_secs(60)));
        assert!(throttle.admit_at(&ClientKey::User(1), start));
    }

    #[tokio::test]
    async fn anonymous_peers_have_separate_buckets() {
        let app = TestApp::with_config(|c| c.gateway.rate_limit_per_minute = 1);

        let (status, _) = send(&app.router, from_peer([10, 0, 0, 1], None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app.router, from_peer([10, 0, 0, 1], None)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "Rate limit exceeded");

        let (status, _) = send(&app.router, from_peer([10, 0, 0, 2], None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signed_in_users_are_counted_by_id() {
        let app = TestApp::with_config(|c| c.gateway.rate_limit_per_minute = 2);
        // Registration carries no peer address, so it lands in its own bucket.
        let (token, _) = app.register("jdoe").await;

        let (status, _) = send(&app.router, from_peer([10, 0, 0, 1], Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        // Same user from another address shares the bucket.
        let (status, _) = send(&app.router, from_peer([10, 0, 0, 2], Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app.router, from_peer([10, 0, 0, 3], Some(&token))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // A forged token falls back to the peer address.
        let (status, _) = send(&app.router, from_peer([10, 0, 0, 3], Some("forged"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
