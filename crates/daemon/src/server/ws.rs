//! Real-time command channel over WebSocket.
//!
//! Each connection runs its own receive loop. The loop ends when the peer
//! disconnects, the host shuts down, or the session is terminated (for
//! example by revoking its device).

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use protocol::{ChannelResponse, ErrorCode};
use tracing::{debug, error, warn};

use super::routes::AppState;

pub async fn channel_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, device_id, state))
}

async fn handle_socket(mut socket: WebSocket, device_id: String, state: AppState) {
    let channel = state.channel;

    let mut session = match channel.connect(&device_id) {
        Ok(session) => session,
        Err(e) => {
            debug!(device_id = %device_id, "Closing channel: {}", e);
            let _ = send_close(&mut socket, close_code::POLICY, "device is not paired").await;
            return;
        }
    };

    let terminated = session.cancellation();
    let shutdown = state.shutdown;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = send_close(&mut socket, close_code::AWAY, "server shutting down").await;
                break;
            }
            _ = terminated.cancelled() => {
                let _ = send_close(&mut socket, close_code::POLICY, "device access revoked").await;
                break;
            }
            inbound = socket.recv() => {
                let response = match inbound {
                    Some(Ok(Message::Text(text))) => {
                        channel.handle_message(&session, text.as_str()).await
                    }
                    Some(Ok(Message::Binary(_))) => ChannelResponse::error(
                        "",
                        ErrorCode::ValidationError,
                        "binary frames are not supported",
                    ),
                    // Pings are answered by the transport.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(session_id = %session.id(), "Channel receive failed: {}", e);
                        break;
                    }
                };

                if let Err(e) = send_response(&mut socket, &response).await {
                    warn!(session_id = %session.id(), "Failed to send channel response: {}", e);
                    break;
                }
            }
        }
    }

    channel.disconnect(&mut session);
}

async fn send_response(
    socket: &mut WebSocket,
    response: &ChannelResponse,
) -> Result<(), axum::Error> {
    let json = match response.to_json() {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to encode channel response: {}", e);
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}

async fn send_close(socket: &mut WebSocket, code: u16, reason: &str) -> Result<(), axum::Error> {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    socket.send(Message::Close(Some(frame))).await
}
