//! WebSocket viewer channel.
//!
//! Each socket is one fan-out subscription. The first frame is always the
//! history snapshot; after that the socket carries live `log` and
//! `path-update` frames, and accepts `manual-command` frames from the page.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use monitor_core::events::LogEvent;
use monitor_runtime::FanoutMessage;

use crate::AppState;

/// Frames sent to the page.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data")]
enum ServerFrame<'a> {
    #[serde(rename = "log-history")]
    LogHistory(&'a [LogEvent]),
    #[serde(rename = "log")]
    Log(&'a LogEvent),
    #[serde(rename = "path-update")]
    PathUpdate(&'a str),
}

impl<'a> From<&'a FanoutMessage> for ServerFrame<'a> {
    fn from(message: &'a FanoutMessage) -> Self {
        match message {
            FanoutMessage::Log(event) => ServerFrame::Log(event),
            FanoutMessage::PathUpdate(path) => ServerFrame::PathUpdate(path),
        }
    }
}

/// Frames received from the page.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
enum ClientFrame {
    #[serde(rename = "manual-command")]
    ManualCommand(String),
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut stop = state.shutdown.subscribe();
    let mut subscription = state.monitor.connect();
    let id = subscription.id();
    let (mut sink, mut stream) = socket.split();

    let history = subscription.take_snapshot();
    if send_frame(&mut sink, &ServerFrame::LogHistory(&history))
        .await
        .is_err()
    {
        return;
    }
    drop(history);

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                if send_frame(&mut sink, &ServerFrame::from(&message)).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_client_text(&state, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(subscriber = id, error = %e, "websocket receive failed");
                        break;
                    }
                }
            }
            changed = stop.changed() => {
                let stopping = changed.is_err() || *stop.borrow();
                if stopping {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    debug!(subscriber = id, "websocket closed");
}

async fn handle_client_text(state: &AppState, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "ignoring unrecognised client frame");
            return;
        }
    };

    match frame {
        ClientFrame::ManualCommand(command) => {
            if command.trim().is_empty() {
                return;
            }
            // Failure is already visible to every viewer as an ERROR line.
            if let Err(e) = state.monitor.submit_command(&command).await {
                warn!(error = %e, "manual command not delivered");
            }
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame<'_>,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "failed to encode frame; skipping");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_parses_manual_command() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"event":"manual-command","data":"pwd"}"#).unwrap();
        let ClientFrame::ManualCommand(command) = frame;
        assert_eq!(command, "pwd");
    }

    #[test]
    fn test_client_frame_rejects_unknown_event() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"event":"shutdown","data":""}"#).is_err());
    }

    #[test]
    fn test_server_frame_shapes() {
        let history = serde_json::to_value(ServerFrame::LogHistory(&[])).unwrap();
        assert_eq!(history, serde_json::json!({ "event": "log-history", "data": [] }));

        let path = serde_json::to_value(ServerFrame::from(&FanoutMessage::PathUpdate(
            "/srv/bot".to_string(),
        )))
        .unwrap();
        assert_eq!(path, serde_json::json!({ "event": "path-update", "data": "/srv/bot" }));
    }
}
