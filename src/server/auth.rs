//! API key authentication.
//!
//! Keys live in a YAML file:
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::error::ApiError;
use super::AppState;

/// API key entry in the key file
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KeyFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// Authenticated user, added to request extensions after auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Maps API key -> user.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Loads keys from `path`. A missing or malformed file leaves the store
    /// empty, so every authenticated request fails.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(store) => {
                    tracing::info!("Loaded {} API key(s)", store.keys.len());
                    store
                }
                Err(e) => {
                    tracing::warn!("Failed to parse key file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read key file {}: {}", path.display(), e);
                tracing::warn!("No API keys loaded - all authenticated requests will fail");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        let file: KeyFile = serde_yaml::from_str(contents)?;
        Ok(Self::from_entries(
            file.api_keys.into_iter().map(|e| (e.key, e.user_id)),
        ))
    }

    pub fn from_entries<K, U>(entries: impl IntoIterator<Item = (K, U)>) -> Self
    where
        K: Into<String>,
        U: Into<String>,
    {
        let keys = entries
            .into_iter()
            .map(|(key, user_id)| {
                (
                    key.into(),
                    AuthUser {
                        user_id: user_id.into(),
                    },
                )
            })
            .collect();
        Self { keys }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// The `key` query parameter, used by WebSocket clients that cannot set
/// headers on the upgrade request.
fn key_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "key")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key.to_string(),
            None => {
                return ApiError::unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
                .into_response();
            }
        },
        None => match request.uri().query().and_then(key_from_query) {
            Some(key) => key,
            None => {
                return ApiError::unauthorized("missing_auth", "Authorization header required")
                    .into_response();
            }
        },
    };

    match state.api_keys.validate(&api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => ApiError::unauthorized("invalid_key", "Invalid API key").into_response(),
    }
}
