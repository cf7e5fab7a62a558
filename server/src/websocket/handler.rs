//! WebSocket handler for the change feed.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::{ClientMessage, ConnectionManager, ServerMessage};
use crate::auth::Session;
use crate::error::{AppError, Result};
use crate::service::DataService;
use crate::AppState;

/// Browsers cannot set headers on a WebSocket upgrade, so the session token
/// travels in the query string.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
}

/// GET /ws?token=... - upgrade to the change feed.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let session = state
        .service
        .sessions()
        .get(&query.token)
        .ok_or(AppError::Unauthorized)?;

    let service = state.service.clone();
    let conn_manager = state.conn_manager.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, service, conn_manager, session)))
}

/// Handle an established WebSocket connection.
///
/// Registers the connection, forwards outgoing messages from a channel,
/// answers client messages until the socket closes, then cleans up.
pub async fn handle_connection(
    socket: WebSocket,
    service: Arc<DataService>,
    conn_manager: Arc<ConnectionManager>,
    session: Session,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let conn_id = conn_manager.register(session.tenant_id.clone(), session.user_id.clone(), tx);
    conn_manager.send_to(
        &conn_id,
        ServerMessage::Welcome {
            tenant_id: session.tenant_id.clone(),
            user_id: session.user_id.clone(),
        },
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = process_message(&text, &service).await;
                conn_manager.send_to(&conn_id, response);
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn_manager.unregister(&conn_id);
    send_task.abort();

    tracing::info!(
        conn_id = %conn_id,
        tenant_id = %session.tenant_id,
        active_connections = conn_manager.connection_count(),
        "WebSocket client disconnected"
    );
}

/// Answer one client message.
async fn process_message(text: &str, service: &DataService) -> ServerMessage {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            return ServerMessage::error(format!("Invalid message format: {}", e), None);
        }
    };

    match client_msg {
        ClientMessage::Status { request_id } => ServerMessage::Status {
            status: service.sync_status().await,
            request_id,
        },
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
