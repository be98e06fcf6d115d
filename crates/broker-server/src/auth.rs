//! API key authentication (spec §6 Auth).
//!
//! A raw key arrives as `X-API-Key` header, `api_key` query parameter, or
//! `api_key` cookie, checked in that priority order (grounded on the
//! original's `APIKeyHeader`/`APIKeyQuery`/`APIKeyCookie` dependency
//! chain). It's hashed with HMAC-SHA-256 under the process secret and
//! looked up; a hit's `last_used` is touched best-effort, never failing
//! the request if the write itself fails.

use crate::envelope::{err, AppCode};
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use broker_core::{guards, GuardOutcome, Key, KeyRole};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";
pub const API_KEY_COOKIE: &str = "api_key";

pub fn hmac_sha256_hex(raw_key: &str, secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(raw_key.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn extract_pair(pairs: &str, name: &str, sep: char) -> Option<String> {
    pairs.split(sep).find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

fn extract_raw_key(parts: &Parts) -> Option<String> {
    if let Some(value) = parts.headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value.to_string());
    }
    if let Some(query) = parts.uri.query() {
        if let Some(value) = extract_pair(query, API_KEY_QUERY, '&') {
            return Some(value);
        }
    }
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    extract_pair(cookie_header, API_KEY_COOKIE, ';')
}

pub enum AuthError {
    Missing,
    Invalid,
    Inactive,
    RoleForbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Missing => err(StatusCode::UNAUTHORIZED, AppCode::ApiKeyMissing),
            AuthError::Invalid => err(StatusCode::UNAUTHORIZED, AppCode::ApiKeyInvalid),
            AuthError::Inactive => err(StatusCode::FORBIDDEN, AppCode::ApiKeyInactive),
            AuthError::RoleForbidden => err(StatusCode::FORBIDDEN, AppCode::RoleForbidden),
        }
    }
}

/// The authenticated caller, extracted once per request. Any handler that
/// restricts itself to certain roles calls [`AuthenticatedKey::require_role`]
/// explicitly rather than relying on a type-level role distinction.
pub struct AuthenticatedKey(pub Key);

impl FromRequestParts<AppState> for AuthenticatedKey {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw_key = extract_raw_key(parts).ok_or(AuthError::Missing)?;

        if raw_key == state.config.admin_key {
            return Ok(AuthenticatedKey(root_key()));
        }

        let key_hash = hmac_sha256_hex(&raw_key, &state.config.hmac_secret);
        let key = state
            .store
            .lookup_key_by_hash(&key_hash)
            .await
            .map_err(|_| AuthError::Invalid)?;

        if guards::key_active(&key) != GuardOutcome::Ok {
            return Err(AuthError::Inactive);
        }

        state.store.touch_key_last_used(key.id).await;
        Ok(AuthenticatedKey(key))
    }
}

impl AuthenticatedKey {
    /// ADMIN is always allowed regardless of the requested role set
    /// (spec §6 Auth; grounded on the original's `require_api_key`).
    pub fn require_role(&self, allowed: &[KeyRole]) -> Result<(), AuthError> {
        if self.0.role == KeyRole::Admin || allowed.is_empty() || allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AuthError::RoleForbidden)
        }
    }
}

/// A synthetic identity for the bootstrap `ADMIN_KEY` secret, which
/// authenticates as ADMIN without a row in `keys` (spec §6 Config).
fn root_key() -> Key {
    Key {
        id: Uuid::nil(),
        label: "root".to_string(),
        role: KeyRole::Admin,
        active: true,
        created: chrono::Utc::now(),
        last_used: None,
    }
}
