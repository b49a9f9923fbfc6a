//! WebSocket Connection Handler
//!
//! Handles individual WebSocket connections and message processing.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::{ClientMessage, ErrorCode, PV_PATH_PREFIX, PVS_PATH, ServerMessage, pv_path};
use super::state::AppState;

/// Handle a WebSocket connection
pub async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<ServerMessage>(256);
    let session_id = state.register_client(tx);

    let connected_msg = ServerMessage::connected(session_id.to_string());
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        let _ = ws_sender.send(Message::Text(json.into())).await;
    }

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => handle_client_message(&state_clone, session_id, &text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.remove_client(session_id);
}

/// Handle one text frame from a client
pub fn handle_client_message(state: &AppState, session_id: Uuid, text: &str) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Failed to parse client message: {}", e);
            send_error(state, session_id, None, ErrorCode::InvalidRequest, "Invalid JSON");
            return;
        }
    };

    let response = match msg {
        ClientMessage::Subscribe { id, paths } => handle_subscribe(state, session_id, id, paths),
        ClientMessage::Unsubscribe { id, paths } => {
            state.unsubscribe(session_id, &paths);
            ServerMessage::success(id, Some(json!({ "unsubscribed": paths })))
        }
        ClientMessage::Get { id, path } => handle_get(state, id, &path),
        ClientMessage::Put { id, path, data } => handle_put(state, id, &path, &data),
        ClientMessage::Ping { id } => ServerMessage::pong(id),
    };

    state.send_to_client(session_id, response);
}

fn address_of(path: &str) -> Option<&str> {
    path.strip_prefix(PV_PATH_PREFIX).filter(|a| !a.is_empty())
}

fn handle_get(state: &AppState, id: String, path: &str) -> ServerMessage {
    let registry = state.registry();

    if path == PVS_PATH {
        let summaries = registry.summaries();
        return ServerMessage::success(id, Some(serde_json::to_value(summaries).unwrap_or(Value::Null)));
    }

    let Some(address) = address_of(path) else {
        return ServerMessage::error_response(
            id,
            ErrorCode::InvalidRequest,
            format!("Unknown path: {}", path),
        );
    };

    match registry.get(address) {
        Some(variable) => ServerMessage::success(
            id,
            Some(serde_json::to_value(variable.snapshot()).unwrap_or(Value::Null)),
        ),
        None => ServerMessage::error_response(id, ErrorCode::NotFound, format!("No such PV: {}", address)),
    }
}

fn handle_put(state: &AppState, id: String, path: &str, data: &Value) -> ServerMessage {
    let Some(address) = address_of(path) else {
        return ServerMessage::error_response(
            id,
            ErrorCode::InvalidRequest,
            format!("Put not supported for path: {}", path),
        );
    };

    match state.registry().put(address, data) {
        Ok(value) => {
            tracing::debug!(address = %address, "Put {}", value);
            ServerMessage::success(id, Some(json!({ "value": value })))
        }
        Err(e) => {
            tracing::info!(address = %address, "Rejected put: {}", e);
            ServerMessage::error_response(id, ErrorCode::from(&e), e.to_string())
        }
    }
}

/// Subscribe and reply with the current value of every matching variable
fn handle_subscribe(state: &AppState, session_id: Uuid, id: String, paths: Vec<String>) -> ServerMessage {
    state.subscribe(session_id, &paths);

    let patterns = state.get_subscriptions(session_id);
    let mut initial_data = serde_json::Map::new();
    for variable in state.registry().variables() {
        let path = pv_path(variable.address());
        if AppState::matches_any_subscription(&patterns, &path) {
            initial_data.insert(path, json!({ "value": variable.value() }));
        }
    }

    ServerMessage::success(
        id,
        Some(json!({
            "subscribed": paths,
            "data": initial_data
        })),
    )
}

fn send_error(
    state: &AppState,
    session_id: Uuid,
    id: Option<&str>,
    code: ErrorCode,
    message: impl Into<String>,
) {
    let error = ServerMessage::Error {
        id: id.map(String::from),
        code,
        message: message.into(),
    };
    state.send_to_client(session_id, error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::{DescriptorBuilder, Registry};
    use notepad_types::PvDefinition;
    use std::sync::Arc;

    fn setup() -> (AppState, Uuid, mpsc::Receiver<ServerMessage>) {
        let registry = Arc::new(Registry::new());
        let definitions = vec![
            PvDefinition::new("TST:RBV").with_write_pv("TST:SP"),
            PvDefinition::new("TST:OTHER"),
        ];
        for descriptor in DescriptorBuilder::new().build_all(&definitions) {
            registry.register_if_absent(descriptor);
        }

        let state = AppState::new(registry);
        let (tx, rx) = mpsc::channel(16);
        let session = state.register_client(tx);
        (state, session, rx)
    }

    fn response(rx: &mut mpsc::Receiver<ServerMessage>) -> (bool, Option<Value>, Option<ErrorCode>) {
        match rx.try_recv().unwrap() {
            ServerMessage::Response { success, data, code, .. } => (success, data, code),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_get_list_and_single() {
        let (state, session, mut rx) = setup();

        handle_client_message(&state, session, r#"{"type": "Get", "id": "1", "path": "/pvs"}"#);
        let (success, data, _) = response(&mut rx);
        assert!(success);
        assert_eq!(data.unwrap().as_array().unwrap().len(), 3);

        handle_client_message(&state, session, r#"{"type": "Get", "id": "2", "path": "/pv/TST:RBV"}"#);
        let (_, data, _) = response(&mut rx);
        let data = data.unwrap();
        assert_eq!(data["read_only"], json!(true));
        assert_eq!(data["paired_address"], json!("TST:SP"));

        handle_client_message(&state, session, r#"{"type": "Get", "id": "3", "path": "/pv/NOPE"}"#);
        assert_eq!(response(&mut rx), (false, None, Some(ErrorCode::NotFound)));
    }

    #[test]
    fn test_put_codes() {
        let (state, session, mut rx) = setup();

        handle_client_message(&state, session, r#"{"type": "Put", "id": "1", "path": "/pv/TST:SP", "data": 3}"#);
        let (success, data, _) = response(&mut rx);
        assert!(success);
        assert_eq!(data, Some(json!({ "value": 3.0 })));
        assert_eq!(
            state.registry().get("TST:RBV").unwrap().value(),
            notepad_types::PvValue::Float(3.0)
        );

        handle_client_message(&state, session, r#"{"type": "Put", "id": "2", "path": "/pv/TST:RBV", "data": 1}"#);
        assert_eq!(response(&mut rx), (false, None, Some(ErrorCode::ReadOnly)));

        handle_client_message(&state, session, r#"{"type": "Put", "id": "3", "path": "/pv/TST:SP", "data": "x"}"#);
        assert_eq!(response(&mut rx), (false, None, Some(ErrorCode::ValidationFailed)));

        handle_client_message(&state, session, r#"{"type": "Put", "id": "4", "path": "/pvs", "data": 1}"#);
        assert_eq!(response(&mut rx), (false, None, Some(ErrorCode::InvalidRequest)));
    }

    #[test]
    fn test_subscribe_returns_initial_values() {
        let (state, session, mut rx) = setup();

        handle_client_message(&state, session, r#"{"type": "Subscribe", "id": "1", "paths": ["/pv/TST:S*"]}"#);
        let (_, data, _) = response(&mut rx);
        let data = data.unwrap();
        let initial = data["data"].as_object().unwrap();
        assert_eq!(initial.len(), 1);
        assert!(initial.contains_key("/pv/TST:SP"));
    }

    #[test]
    fn test_invalid_json_and_ping() {
        let (state, session, mut rx) = setup();

        handle_client_message(&state, session, "{nope");
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Error { code: ErrorCode::InvalidRequest, .. }
        ));

        handle_client_message(&state, session, r#"{"type": "Ping", "id": "9"}"#);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Pong { id } if id == "9"));
    }
}
