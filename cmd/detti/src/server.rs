//! HTTP API over a [`DettiDb`].
//!
//! API endpoints:
//! - GET    /get/{key}            - `{key: value}`
//! - PUT    /set                  - form body, each pair stored as a string
//! - PUT    /set_json             - JSON object body, values keep their type
//! - POST   /append/{key}         - JSON body appended to a list
//! - GET    /exists/{key}         - `true` or `false`
//! - GET    /search_key/{prefix}  - entries whose key starts with prefix
//! - GET    /search_val/{prefix}  - entries whose string value starts with prefix
//! - DELETE /delete/{key}         - remove a key
//! - GET    /ping                 - `"PONG"`
//! - GET    /getall               - every entry
//! - GET    /stats                - entry count and file size
//! - POST   /auth                 - `{username, password}` to `{access_token}`,
//!   only when credentials are configured

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Form, Json, Router,
};
use serde_json::{json, Map, Value as JsonValue};
use tokio::task::JoinError;
use tracing::error;

use detti_cli::ServerConfig;
use detti_kv::{DettiDb, KVError, Stats, Value};

use crate::auth::{self, TokenAuth};
use crate::limiter::{self, RateLimiter};

#[derive(Clone)]
struct AppState {
    db: Arc<DettiDb>,
}

/// Error response with a `{"message": ...}` body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl From<KVError> for ApiError {
    fn from(err: KVError) -> Self {
        let status = match &err {
            KVError::Rejected(_) => StatusCode::BAD_REQUEST,
            KVError::NotFound(_) => StatusCode::NOT_FOUND,
            KVError::NotList(_) => StatusCode::CONFLICT,
            KVError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            KVError::WriteFailed { .. }
            | KVError::CorruptData { .. }
            | KVError::Io { .. }
            | KVError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        error!("detti: store task failed: {}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Builds the router with token auth and rate limiting from `cfg`.
pub fn router(db: Arc<DettiDb>, cfg: &ServerConfig) -> anyhow::Result<Router> {
    let mut app = Router::new()
        .route("/get/{key}", get(get_key))
        .route("/set", put(set_form))
        .route("/set_json", put(set_json))
        .route("/append/{key}", post(append))
        .route("/exists/{key}", get(exists))
        .route("/search_key/{prefix}", get(search_key))
        .route("/search_val/{prefix}", get(search_val))
        .route("/delete/{key}", delete(delete_key))
        .route("/ping", get(ping))
        .route("/getall", get(get_all))
        .route("/stats", get(stats))
        .with_state(AppState { db });

    if let Some(token_auth) = TokenAuth::from_config(cfg)? {
        let token_auth = Arc::new(token_auth);
        app = app
            .route_layer(middleware::from_fn_with_state(
                Arc::clone(&token_auth),
                auth::require_token,
            ))
            .merge(
                Router::new()
                    .route("/auth", post(auth::issue_token))
                    .with_state(token_auth),
            );
    }

    let limiter = RateLimiter::new(&cfg.limits);
    if !limiter.is_disabled() {
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(limiter),
            limiter::enforce,
        ));
    }

    Ok(app)
}

/// Runs a store call off the async runtime.
async fn blocking<T, F>(db: &Arc<DettiDb>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&DettiDb) -> T + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    Ok(tokio::task::spawn_blocking(move || f(&db)).await?)
}

fn missing_key(key: &str) -> ApiError {
    ApiError::not_found(format!("'{}' key doesn't exist in DB.", key))
}

async fn get_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<BTreeMap<String, Value>> {
    let lookup = key.clone();
    match blocking(&state.db, move |db| db.get(&lookup)).await? {
        Some(value) => Ok(Json(BTreeMap::from([(key, value)]))),
        None => Err(missing_key(&key)),
    }
}

async fn set_form(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> ApiResult<&'static str> {
    blocking(&state.db, move |db| {
        pairs
            .into_iter()
            .try_for_each(|(key, value)| db.set_string(&key, value))
    })
    .await??;
    Ok(Json("OK"))
}

async fn set_json(
    State(state): State<AppState>,
    Json(entries): Json<Map<String, JsonValue>>,
) -> ApiResult<&'static str> {
    blocking(&state.db, move |db| {
        entries
            .into_iter()
            .try_for_each(|(key, value)| db.set(&key, value))
    })
    .await??;
    Ok(Json("OK"))
}

async fn append(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(element): Json<JsonValue>,
) -> ApiResult<&'static str> {
    blocking(&state.db, move |db| db.append(&key, element)).await??;
    Ok(Json("OK"))
}

async fn exists(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<bool> {
    Ok(Json(blocking(&state.db, move |db| db.exists(&key)).await?))
}

async fn search_key(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> ApiResult<BTreeMap<String, Value>> {
    let needle = prefix.clone();
    let found = blocking(&state.db, move |db| db.search_by_key_prefix(&needle)).await?;
    if found.is_empty() {
        return Err(ApiError::not_found(format!(
            "No key found with '{}' prefix.",
            prefix
        )));
    }
    Ok(Json(found))
}

async fn search_val(
    State(state): State<AppState>,
    Path(prefix): Path<String>,
) -> ApiResult<BTreeMap<String, Value>> {
    let needle = prefix.clone();
    let found = blocking(&state.db, move |db| db.search_by_value_prefix(&needle)).await?;
    if found.is_empty() {
        return Err(ApiError::not_found(format!(
            "No value found with '{}' prefix.",
            prefix
        )));
    }
    Ok(Json(found))
}

async fn delete_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<&'static str> {
    let target = key.clone();
    match blocking(&state.db, move |db| db.delete(&target)).await? {
        Ok(()) => Ok(Json("OK")),
        Err(KVError::NotFound(_)) => Err(missing_key(&key)),
        Err(e) => Err(e.into()),
    }
}

async fn ping() -> Json<&'static str> {
    Json("PONG")
}

async fn get_all(State(state): State<AppState>) -> ApiResult<BTreeMap<String, Value>> {
    Ok(Json(blocking(&state.db, |db| db.get_all()).await?))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Stats> {
    Ok(Json(blocking(&state.db, |db| db.stats()).await??))
}
