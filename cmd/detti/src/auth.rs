//! Token authentication.
//!
//! `POST /auth` trades the configured user name and password for a signed
//! token. Every other route then needs `Authorization: JWT <token>`
//! (`Bearer <token>` is accepted too).

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use detti_cli::ServerConfig;

/// Token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// `POST /auth` body.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// `POST /auth` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
}

/// Issues and verifies tokens for the single configured user.
pub struct TokenAuth {
    user: String,
    password: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenAuth {
    pub fn new(user: &str, password: &str, secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    /// Returns the configured authenticator, or `None` when auth is off.
    ///
    /// Without `token_secret` a random key is drawn, so tokens do not
    /// survive a restart.
    pub fn from_config(cfg: &ServerConfig) -> anyhow::Result<Option<Self>> {
        if !cfg.auth_enabled() {
            return Ok(None);
        }
        let secret = if cfg.token_secret.is_empty() {
            let mut buf = vec![0u8; 32];
            getrandom::fill(&mut buf)
                .map_err(|e| anyhow::anyhow!("auth: cannot generate token secret: {}", e))?;
            buf
        } else {
            cfg.token_secret.as_bytes().to_vec()
        };
        Ok(Some(Self::new(
            &cfg.user,
            &cfg.password,
            &secret,
            cfg.token_ttl_secs,
        )))
    }

    /// Checks a user name and password. Both are always compared.
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        let user_ok = ct_eq(username.as_bytes(), self.user.as_bytes());
        let password_ok = ct_eq(password.as_bytes(), self.password.as_bytes());
        user_ok & password_ok
    }

    /// Signs a token valid from `now` for the configured lifetime.
    pub fn issue(&self, now: DateTime<Utc>) -> jsonwebtoken::errors::Result<String> {
        let claims = Claims {
            sub: self.user.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Verifies signature, expiry and subject.
    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.sub = Some(self.user.clone());
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

/// Compares two byte strings in time independent of where they differ.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn unauthorized(message: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": message.into() })),
    )
        .into_response()
}

/// `POST /auth`: returns `{"access_token": ...}` for valid credentials.
pub async fn issue_token(
    State(auth): State<Arc<TokenAuth>>,
    Json(req): Json<AuthRequest>,
) -> Response {
    if !auth.check_credentials(&req.username, &req.password) {
        warn!("detti: bad credentials for {:?}", req.username);
        return unauthorized("Invalid credentials");
    }
    match auth.issue(Utc::now()) {
        Ok(access_token) => {
            info!("detti: issued token for {:?}", req.username);
            Json(AuthResponse { access_token }).into_response()
        }
        Err(e) => {
            error!("detti: cannot sign token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "cannot issue token" })),
            )
                .into_response()
        }
    }
}

/// Rejects requests without a valid token.
pub async fn require_token(
    State(auth): State<Arc<TokenAuth>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers()) else {
        warn!("detti: missing token for {} {}", req.method(), req.uri().path());
        return unauthorized("Authorization Required");
    };

    match auth.verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            warn!("detti: rejected token: {}", e);
            unauthorized(format!("Invalid token: {}", e))
        }
    }
}

/// Extracts the token from a `JWT` or `Bearer` authorization header.
fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("JWT ")
        .or_else(|| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
