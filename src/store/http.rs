//! Client for the Backforge server: REST for reads and writes, a WebSocket
//! per subscription for change events.

use async_trait::async_trait;
use futures::{future, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use super::{ChangeEvent, ChangeStream, Entity, EntityStore, Snapshot, StoreError, Table, WaitlistStore};
use crate::models::{Account, NewSignup, WaitlistSignup};

pub struct HttpStore {
    server_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct WaitlistResponse {
    status: String,
    #[serde(default)]
    signup: Option<WaitlistSignup>,
}

impl HttpStore {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// The caller's account, created by the server on first access.
    pub async fn me(&self) -> Result<Account, StoreError> {
        let response = self
            .client
            .get(self.url("/api/v1/me"))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_base(), path)
    }

    fn http_base(&self) -> String {
        if self.server_url.starts_with("ws://") {
            self.server_url.replacen("ws://", "http://", 1)
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replacen("wss://", "https://", 1)
        } else if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        }
    }

    fn build_ws_url(&self, table: Table, scope: Uuid) -> String {
        // Convert http(s) to ws(s) if needed
        let base_url = if self.server_url.starts_with("http://") {
            self.server_url.replacen("http://", "ws://", 1)
        } else if self.server_url.starts_with("https://") {
            self.server_url.replacen("https://", "wss://", 1)
        } else if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            format!("ws://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!(
            "{}/api/v1/changes/{}/{}?key={}",
            base_url,
            table,
            scope,
            urlencoding::encode(&self.api_key)
        )
    }
}

/// Collection route for a table within a scope. Projects are scoped by the
/// caller's account, which the server derives from the API key.
fn collection_path(table: Table, scope: Uuid) -> String {
    match table {
        Table::Projects => "/api/v1/projects".to_string(),
        _ => format!("/api/v1/projects/{}/{}", scope, table),
    }
}

fn item_path(table: Table, id: Uuid) -> String {
    format!("/api/v1/{}/{}", table, id)
}

fn http_error(err: reqwest::Error) -> StoreError {
    StoreError::Http(err.to_string())
}

/// Maps a non-success response to the matching [`StoreError`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    let message = body["message"]
        .as_str()
        .unwrap_or("Unknown error")
        .to_string();

    Err(match status {
        404 => StoreError::NotFound(message),
        409 => StoreError::UniqueViolation(message),
        _ => StoreError::Server { status, message },
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    check(response).await?.json().await.map_err(http_error)
}

#[async_trait]
impl<E: Entity> EntityStore<E> for HttpStore {
    async fn query(&self, scope: Uuid) -> Result<Snapshot<E>, StoreError> {
        let response = self
            .client
            .get(self.url(&collection_path(E::TABLE, scope)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    async fn insert(&self, scope: Uuid, new: E::New) -> Result<E, StoreError> {
        let response = self
            .client
            .post(self.url(&collection_path(E::TABLE, scope)))
            .bearer_auth(&self.api_key)
            .json(&new)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E, StoreError> {
        let response = self
            .client
            .patch(self.url(&item_path(E::TABLE, id)))
            .bearer_auth(&self.api_key)
            .json(&patch)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&item_path(E::TABLE, id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(http_error)?;
        check(response).await?;
        Ok(())
    }

    async fn subscribe(&self, scope: Uuid) -> Result<ChangeStream, StoreError> {
        let table = E::TABLE;
        let ws_url = self.build_ws_url(table, scope);

        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| StoreError::WebSocket(e.to_string()))?;
        tracing::debug!("Subscribed to {}/{}", table, scope);

        let events = ws_stream
            .take_while(|message| {
                if let Err(e) = message {
                    tracing::warn!("Change feed closed: {}", e);
                }
                future::ready(message.is_ok())
            })
            .filter_map(move |message| {
                let event = match message {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ChangeEvent>(text.as_str()) {
                            Ok(event) => Some(event),
                            Err(e) => {
                                tracing::warn!("Undecodable change event: {}", e);
                                Some(ChangeEvent::resync(table, scope))
                            }
                        }
                    }
                    _ => None,
                };
                future::ready(event)
            });

        Ok(events.boxed())
    }
}

#[async_trait]
impl WaitlistStore for HttpStore {
    async fn insert_signup(&self, signup: NewSignup) -> Result<WaitlistSignup, StoreError> {
        let email = signup.email.clone();
        let response = self
            .client
            .post(self.url("/api/v1/waitlist"))
            .json(&signup)
            .send()
            .await
            .map_err(http_error)?;
        let body: WaitlistResponse = decode(response).await?;

        match (body.status.as_str(), body.signup) {
            ("joined", Some(signup)) => Ok(signup),
            ("already_joined", _) => Err(StoreError::UniqueViolation(format!(
                "waitlist_signups.email: {}",
                email
            ))),
            (status, _) => Err(StoreError::Http(format!(
                "unexpected waitlist status '{}'",
                status
            ))),
        }
    }
}
