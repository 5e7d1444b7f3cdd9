use std::sync::Arc;

use axum::{
    http::{header, HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config::{ApiKeyEntry, AuthConfig};

/// Keys with this role may only issue read requests.
pub const READER_ROLE: &str = "reader";

/// Authenticated caller identity, available to handlers via request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerIdentity {
    pub name: String,
    pub role: String,
}

impl CallerIdentity {
    pub fn can_write(&self) -> bool {
        self.role != READER_ROLE
    }
}

#[derive(Serialize)]
struct AuthError {
    success: bool,
    error: String,
}

fn reject(status: StatusCode, error: &str) -> Response {
    (status, Json(AuthError { success: false, error: error.to_string() })).into_response()
}

/// Key from `X-API-Key`, falling back to `Authorization: Bearer <key>`.
pub fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("X-API-Key")
        .or_else(|| headers.get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
}

/// Finds the configured entry for `key`. Every entry is compared so the
/// time taken does not depend on which one matches.
pub fn find_key<'a>(config: &'a AuthConfig, key: &str) -> Option<&'a ApiKeyEntry> {
    let mut found = None;
    for entry in &config.api_keys {
        if bool::from(entry.key.as_bytes().ct_eq(key.as_bytes())) && found.is_none() {
            found = Some(entry);
        }
    }
    found
}

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

pub async fn auth_middleware<B>(
    Extension(config): Extension<Arc<AuthConfig>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    if !config.enabled {
        req.extensions_mut().insert(CallerIdentity {
            name: "anonymous".to_string(),
            role: "admin".to_string(),
        });
        return next.run(req).await;
    }

    let Some(key) = presented_key(req.headers()) else {
        return reject(
            StatusCode::UNAUTHORIZED,
            "Missing API key. Provide X-API-Key header or Authorization: Bearer <key>",
        );
    };
    let Some(entry) = find_key(&config, key) else {
        tracing::warn!(path = %req.uri().path(), "Invalid API key presented");
        return reject(StatusCode::UNAUTHORIZED, "Invalid API key");
    };

    let caller = CallerIdentity {
        name: entry.name.clone(),
        role: entry.role.clone(),
    };
    if !caller.can_write() && !is_read(req.method()) {
        tracing::warn!(caller = %caller.name, method = %req.method(), path = %req.uri().path(), "Write refused for read-only key");
        return reject(StatusCode::FORBIDDEN, "API key is read-only");
    }

    tracing::debug!(caller = %caller.name, role = %caller.role, "Authenticated request");
    req.extensions_mut().insert(caller);
    next.run(req).await
}
