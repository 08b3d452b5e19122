use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::AppState;
use crate::models::notifications::Event;
use crate::services::registry::ConnectionRegistry;

/// Sent back once a `registerUser` frame has been applied.
pub const REGISTERED_EVENT: &str = "registered";

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum ClientMessage {
    RegisterUser {
        #[serde(rename = "userId")]
        user_id: i64,
    },
}

pub async fn connect(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

async fn handle_socket(socket: WebSocket, registry: ConnectionRegistry) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    log::debug!("Connection {} opened", connection_id);

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Could not encode {} event: {}", event.event, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::RegisterUser { user_id }) => {
                    registry.register(user_id, connection_id, event_tx.clone());
                    let _ = event_tx.send(Event {
                        event: REGISTERED_EVENT.to_string(),
                        payload: json!({"userId": user_id}),
                    });
                }
                Err(e) => log::debug!("Ignoring frame on {}: {}", connection_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.remove_connection(connection_id);
    writer.abort();
    log::debug!("Connection {} closed", connection_id);
}
