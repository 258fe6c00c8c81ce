//! services/tracker/src/web/ws_handler.rs
//!
//! The entry point and control loop for a WebSocket connection. Each
//! connection is one application instance with its own controller.

use crate::{
    controller::{Controller, TrackerState},
    view,
    web::{
        protocol::{ClientMessage, ServerMessage},
        state::AppState,
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

async fn send_render(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &TrackerState,
) -> Result<(), axum::Error> {
    let message = ServerMessage::Render {
        screen: view::render(state),
    };
    send_message(sender, &message).await
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!(
        "New WebSocket connection established for app '{}'.",
        app_state.config.app_id
    );
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let token = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
                Ok(ClientMessage::Init { token }) => token,
                _ => {
                    error!("First message was not a valid Init message.");
                    let message = ServerMessage::Error {
                        message: "The first message must be an init message.".to_string(),
                    };
                    let _ = send_message(&mut sender, &message).await;
                    return;
                }
            }
        }
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    let handle = Controller::spawn(app_state.identity.clone(), app_state.store.clone(), token);
    let mut state_rx = handle.state();

    // --- 2. Main Message Loop ---
    // Every published state is rendered in full; intermediate states that
    // arrive while a send is in flight are coalesced by the watch channel.
    let initial = state_rx.borrow_and_update().clone();
    if send_render(&mut sender, &initial).await.is_err() {
        error!("Failed to send the initial render.");
        handle.shutdown().await;
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(ClientMessage::Init { .. }) => {
                            warn!("Received subsequent Init message, which is ignored.");
                        }
                        Ok(message) => {
                            if let Some(command) = message.into_command() {
                                if !handle.send(command).await {
                                    error!("Controller stopped unexpectedly.");
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Failed to deserialize client message: {}", e);
                            let message = ServerMessage::Error {
                                message: format!("Unrecognized message: {}", e),
                            };
                            if send_message(&mut sender, &message).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive failed: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                if send_render(&mut sender, &state).await.is_err() {
                    error!("Failed to send render to client.");
                    break;
                }
            }
        }
    }

    // --- 3. Cleanup ---
    handle.shutdown().await;
    info!("WebSocket connection closed.");
}
