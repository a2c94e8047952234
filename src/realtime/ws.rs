use axum::{extract::ws::{Message, WebSocket, WebSocketUpgrade}, extract::State, response::IntoResponse, routing::get, Router};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

use crate::routes::AppState;

use super::{decode, encode, Broadcaster};

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

// Each socket is one tab: it gets its own channel instance so its own frames
// are not echoed back.
async fn handle_socket(state: AppState, socket: WebSocket) {
    let channel = state.open_tab();
    let tab = Uuid::new_v4();
    let mut subscription = channel.subscribe();
    let (mut sink, mut inbound) = socket.split();
    tracing::info!(%tab, relaying = state.is_relaying(), "tab connected");

    let forward = tokio::spawn(async move {
        while let Some(envelope) = subscription.next().await {
            let Some(text) = encode(&envelope) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The socket lives as long as its inbound half; with broadcast disabled
    // the forward side ends right away.
    while let Some(Ok(message)) = inbound.next().await {
        match message {
            Message::Text(text) => {
                if let Some(envelope) = decode(&text) {
                    tracing::debug!(%tab, id = envelope.id(), "relaying envelope");
                    channel.publish(&envelope);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    forward.abort();
    tracing::info!(%tab, "tab disconnected");
}
