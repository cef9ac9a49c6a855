use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::room::RoomService;
use crate::types::{ChangeKind, RoomChange};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room_id: String,
}

/// GET /ws?room_id=...
///
/// Pushes a JSON [`RoomChange`] for every write to the room. Clients re-fetch
/// what changed; nothing else is sent.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(service): State<Arc<RoomService>>,
) -> Response {
    // Reject unknown rooms before upgrading
    if let Err(e) = service.room(&params.room_id).await {
        return e.into_response();
    }
    tracing::info!("Change feed requested for room {}", params.room_id);

    ws.on_upgrade(move |socket| handle_socket(socket, params.room_id, service))
}

async fn handle_socket(socket: WebSocket, room_id: String, service: Arc<RoomService>) {
    let (mut sender, mut receiver) = socket.split();
    let mut changes = service.subscribe();

    loop {
        tokio::select! {
            change = changes.recv() => {
                let change = match change {
                    Ok(change) if change.room_id == room_id => change,
                    Ok(_) => continue,
                    // Missed notifications: tell the client to re-fetch the room
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Feed for {} lagged by {}", room_id, skipped);
                        RoomChange { room_id: room_id.clone(), kind: ChangeKind::Room }
                    }
                    Err(RecvError::Closed) => break,
                };
                let json = match serde_json::to_string(&change) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to encode change: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error on feed {}: {}", room_id, e);
                    break;
                }
            }
        }
    }

    tracing::info!("Change feed for room {} closed", room_id);
}
