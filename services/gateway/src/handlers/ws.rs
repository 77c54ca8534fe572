//! WebSocket subscriber connections
//!
//! Server-write-only: every hub broadcast is forwarded to the client, and
//! client frames are read only to notice a close.

use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::hub::HubHandle;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let mut subscriber = hub.register();
    let connection_id = subscriber.id();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = subscriber.recv().await {
            if let Err(e) = sink.send(into_message(frame)).await {
                debug!(connection_id, error = %e, "WebSocket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.unregister(connection_id);
}

/// Text frame when the payload is UTF-8, binary otherwise.
fn into_message(frame: Bytes) -> Message {
    match std::str::from_utf8(&frame) {
        Ok(text) => Message::Text(Utf8Bytes::from(text)),
        Err(_) => Message::Binary(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_payload_sent_as_text() {
        match into_message(Bytes::from_static(br#"{"type":"trade"}"#)) {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"type":"trade"}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_non_utf8_payload_sent_as_binary() {
        let raw = Bytes::from_static(&[0xff, 0x00, 0x10]);
        match into_message(raw.clone()) {
            Message::Binary(bytes) => assert_eq!(bytes, raw),
            other => panic!("expected binary frame, got {other:?}"),
        }
    }
}
