//! WebSocket change feed.
//!
//! URL: ws(s)://{host}/api/v1/changes/{table}/{scope}?key={api_key}
//!
//! Each change to the table within the scope is sent as one JSON text
//! message. The feed is server-to-client only; client text is ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::routes::{account_for, authorize_scope};
use super::AppState;
use crate::store::{ChangeStream, Table};

/// Checks ownership and subscribes before upgrading, so no change made
/// after the handshake is missed.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((table, scope)): Path<(String, Uuid)>,
) -> Result<Response, ApiError> {
    let table = Table::parse(&table)
        .ok_or_else(|| ApiError::not_found(format!("unknown table '{}'", table)))?;
    let account = account_for(&state, &user).await?;
    authorize_scope(&state, &account, table, scope).await?;

    let changes = state.store.hub().stream(table, scope).await;
    tracing::info!("User {} following {}/{}", user.user_id, table, scope);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, changes)))
}

async fn handle_socket(socket: WebSocket, mut changes: ChangeStream) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            event = changes.next() => {
                let Some(event) = event else {
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to serialize change event: {}", e);
                    }
                }
            }
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Change feed socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("Change feed closed");
}
