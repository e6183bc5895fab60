//! WebSocket upgrade + event loop. Every committed mutation is pushed to the
//! client as an `invalidate` message; `ping` is answered with `pong`.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "exercise_bank", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "exercise_bank", "WebSocket connected");
  let mut events = state.events.subscribe();

  loop {
    let outgoing = tokio::select! {
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Text(txt))) => Some(handle_client_text(&txt)),
        Some(Ok(Message::Ping(payload))) => {
          let _ = socket.send(Message::Pong(payload)).await;
          None
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => None,
        Some(Err(e)) => {
          warn!(target: "exercise_bank", error = %e, "WS receive error");
          break;
        }
      },
      event = events.recv() => match event {
        Ok(event) => Some(ServerWsMessage::Invalidate { event }),
        Err(RecvError::Lagged(skipped)) => {
          warn!(target: "exercise_bank", skipped, "WS client lagged behind mutation events");
          None
        }
        Err(RecvError::Closed) => break,
      },
    };

    if let Some(msg) = outgoing {
      if let Err(e) = socket.send(Message::Text(encode(&msg))).await {
        error!(target: "exercise_bank", error = %e, "WS send error");
        break;
      }
    }
  }
  info!(target: "exercise_bank", "WebSocket disconnected");
}

fn handle_client_text(txt: &str) -> ServerWsMessage {
  match serde_json::from_str::<ClientWsMessage>(txt) {
    Ok(incoming) => {
      debug!(target: "exercise_bank", "WS received: {:?}", &incoming);
      match incoming {
        ClientWsMessage::Ping => ServerWsMessage::Pong,
      }
    }
    Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::{MutationEvent, Scope};

  #[test]
  fn ping_gets_pong() {
    assert_eq!(encode(&handle_client_text(r#"{"type":"ping"}"#)), r#"{"type":"pong"}"#);
  }

  #[test]
  fn garbage_gets_error() {
    let out = encode(&handle_client_text("not json"));
    assert!(out.starts_with(r#"{"type":"error""#));
  }

  #[test]
  fn invalidate_is_flat() {
    let msg = ServerWsMessage::Invalidate {
      event: MutationEvent { scope: Scope::Rules { owner_id: "u1".into() } },
    };
    let v: serde_json::Value = serde_json::from_str(&encode(&msg)).unwrap();
    assert_eq!(v, serde_json::json!({ "type": "invalidate", "scope": "rules", "ownerId": "u1" }));
  }
}
