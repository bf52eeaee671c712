use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::ServerEvent;
use crate::error::{AppError, AppResult};
use crate::extractors::{authenticate, Query};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// `GET /api/ws?token=...`. Browsers cannot attach headers to a socket
/// handshake, so the session token travels in the query string.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
) -> AppResult<Response> {
    let token = query.token.ok_or(AppError::Unauthorized)?;
    let user = authenticate(&state, &token)?;
    let user_id = user.id.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut events) = state.hub.connect(&user_id).await;

    // `connect` queues the presence list first; it leads, the unread count follows.
    if let Ok(presence) = events.try_recv() {
        let _ = send_event(&mut sender, &presence).await;
    }
    match state.chat.unread_count(&user_id).await {
        Ok(count) => {
            let _ = send_event(&mut sender, &ServerEvent::UnreadCount { count }).await;
        }
        Err(e) => tracing::warn!(user_id = %user_id, "Initial unread count failed: {}", e),
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    // Clients only talk to us over REST; inbound frames just keep the socket alive
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.disconnect(&user_id, connection).await;
}

async fn send_event<S>(sender: &mut S, event: &ServerEvent) -> Result<(), axum::Error>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Event serialization failed: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
