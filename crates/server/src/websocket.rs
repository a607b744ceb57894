//! Call-control WebSocket
//!
//! One socket per call. The reader loop feeds raw text frames to the call's
//! `CallConnection`; a writer task drains the call's link and encodes every
//! outbound frame as its own text message, preserving batch order.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};

use call_agent_agent::{CallLink, FrameReceiver};
use call_agent_core::codec;

use crate::state::AppState;
use crate::ServerError;

/// Call-control WebSocket handler
pub struct CallControlHandler;

impl CallControlHandler {
    /// Handle WebSocket upgrade
    ///
    /// Capacity is checked before the upgrade so the platform gets a plain
    /// 503 instead of a socket that closes immediately.
    pub async fn handle(
        ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
        State(state): State<AppState>,
    ) -> Response {
        if state.at_capacity() {
            tracing::warn!(
                active_calls = state.active_calls(),
                "Refusing call-control connection at capacity"
            );
            return StatusCode::from(ServerError::AtCapacity).into_response();
        }

        let ws = match ws {
            Ok(ws) => ws,
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Invalid call-control upgrade");
                return rejection.into_response();
            }
        };

        let subprotocol = state.config.server.ws_subprotocol.clone();
        ws.protocols([subprotocol])
            .on_upgrade(move |socket| Self::handle_socket(socket, state))
    }

    /// Handle WebSocket connection
    async fn handle_socket(socket: WebSocket, state: AppState) {
        let (link, frames) = CallLink::channel();

        let mut connection = match state.registry.on_connect(link) {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "Call-control connection refused");
                let _ = socket.close().await;
                return;
            }
        };

        tracing::info!(connection_id = %connection.id(), "New call-control connection");

        let (sender, mut receiver) = socket.split();
        let writer = tokio::spawn(Self::write_frames(sender, frames));

        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => connection.on_message(text.as_bytes()),
                Ok(Message::Binary(data)) => {
                    tracing::debug!(
                        connection_id = %connection.id(),
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(connection_id = %connection.id(), ?frame, "Close frame received");
                    break;
                }
                // Ping/pong are answered by the WebSocket layer
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Socket error");
                    break;
                }
            }
        }

        tracing::info!(
            connection_id = %connection.id(),
            call_sid = connection.call_sid().unwrap_or("-"),
            "Call-control connection closed"
        );
        connection.on_disconnect();
        writer.abort();
    }

    async fn write_frames(
        mut sender: futures::stream::SplitSink<WebSocket, Message>,
        mut frames: FrameReceiver,
    ) {
        while let Some(batch) = frames.recv().await {
            for frame in batch {
                let text = match codec::encode(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text)).await {
                    tracing::debug!(error = %e, "Socket write failed");
                    return;
                }
            }
        }
        let _ = sender.close().await;
    }
}
