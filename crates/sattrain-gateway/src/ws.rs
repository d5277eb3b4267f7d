//! WebSocket adapter.
//!
//! One socket per operator per session. Room events are forwarded as JSON
//! text frames shaped `{"event": name, "payload": {...}}`. Inbound frames:
//!
//! ```text
//!   {"type": "command", "name": "EXECUTE_BURN", "payload": {...}, "requestId": "r1"}
//!     → {"type": "ack", "requestId": "r1", "ok": true, "data": CommandOutcome}
//!   {"type": "ping"}
//!     → {"type": "pong"}
//! ```

use crate::api::{AppState, USER_HEADER};
use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sattrain_sim::{SessionEvent, SessionManager};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Command {
        name: String,
        #[serde(default)]
        payload: Value,
        #[serde(default, rename = "requestId")]
        request_id: Option<String>,
    },
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Ack {
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Pong,
    Error {
        error: String,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let user = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(params.user_id);
    let Some(user) = user else {
        return (StatusCode::UNAUTHORIZED, "missing user id").into_response();
    };

    match state.manager.owner_of(&session_id).await {
        None => return (StatusCode::NOT_FOUND, "session not found").into_response(),
        Some(owner) if owner != user => {
            return (StatusCode::FORBIDDEN, "not the session owner").into_response();
        }
        Some(_) => {}
    }
    let Some(events) = state.rooms.subscribe(&session_id) else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let manager = Arc::clone(&state.manager);
    ws.on_upgrade(move |socket| serve_socket(socket, manager, session_id, user, events))
}

async fn serve_socket(
    mut socket: WebSocket,
    manager: Arc<SessionManager>,
    session_id: String,
    user: String,
    mut events: broadcast::Receiver<Arc<SessionEvent>>,
) {
    debug!(%session_id, %user, "socket joined room");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(event.as_ref()) else {
                        continue;
                    };
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%session_id, skipped, "socket lagging, events skipped");
                }
                // Room closed: the session ended.
                Err(broadcast::error::RecvError::Closed) => break,
            },

            frame = socket.recv() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                let reply = match frame {
                    Message::Text(text) => handle_text(&manager, &session_id, &user, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(text) = serde_json::to_string(&reply) else {
                    continue;
                };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    debug!(%session_id, %user, "socket left room");
}

pub async fn handle_text(
    manager: &SessionManager,
    session_id: &String,
    user: &str,
    text: &str,
) -> ServerMessage {
    let mut bytes = text.as_bytes().to_vec();
    let msg = match simd_json::from_slice::<ClientMessage>(&mut bytes) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::Error {
                error: format!("invalid message: {e}"),
            };
        }
    };

    match msg {
        ClientMessage::Ping => ServerMessage::Pong,
        ClientMessage::Command {
            name,
            payload,
            request_id,
        } => match manager.route_command(session_id, user, &name, payload).await {
            Ok(outcome) => ServerMessage::Ack {
                request_id,
                ok: true,
                data: serde_json::to_value(&outcome).ok(),
                error: None,
            },
            Err(e) => ServerMessage::Ack {
                request_id,
                ok: false,
                data: None,
                error: Some(e.to_string()),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sattrain_sim::{BroadcastRooms, MemoryStore, SimConfig};

    async fn running_session() -> (Arc<SessionManager>, String) {
        let rooms = Arc::new(BroadcastRooms::new(16));
        let manager = SessionManager::new(SimConfig::default(), Arc::new(MemoryStore::new()), rooms);
        let id = manager
            .create_session("op".into(), "leo-orbit-raise", None)
            .await
            .unwrap()
            .session_id;
        manager.start_session(&id).await.unwrap();
        (manager, id)
    }

    #[tokio::test]
    async fn test_command_frames_are_acked() {
        let (manager, id) = running_session().await;
        let reply = handle_text(
            &manager,
            &id,
            "op",
            r#"{"type":"command","name":"ARM_PROPULSION","requestId":"r1"}"#,
        )
        .await;
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["result"]["status"], "OK");

        let reply = handle_text(
            &manager,
            &id,
            "intruder",
            r#"{"type":"command","name":"ARM_PROPULSION"}"#,
        )
        .await;
        assert!(matches!(reply, ServerMessage::Ack { ok: false, .. }));
        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_ping_and_garbage() {
        let (manager, id) = running_session().await;
        assert!(matches!(
            handle_text(&manager, &id, "op", r#"{"type":"ping"}"#).await,
            ServerMessage::Pong
        ));
        assert!(matches!(
            handle_text(&manager, &id, "op", "not json").await,
            ServerMessage::Error { .. }
        ));
        manager.stop_all().await;
    }
}
