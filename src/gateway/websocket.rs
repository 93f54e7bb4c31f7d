use std::str::FromStr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use super::events::{ClientMessage, ServerMessage};
use super::handlers::ApiError;
use super::principal::Principal;
use super::state::AppState;
use crate::domain::SessionId;
use crate::error::CacError;
use crate::store::SessionStore;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    principal: Principal,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = SessionId::from_str(&session_id)
        .map_err(|_| ApiError(CacError::NotFound(format!("not a session id: {session_id}"))))?;
    let session = state.store.load(id).await?;
    principal.authorize(&session.student_ref, &session.course_ref)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, session_id)))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    let Ok(session_id) = SessionId::from_str(&session_id) else {
        let _ = send_message(&mut socket, &ServerMessage::error("not a session id")).await;
        return;
    };
    let Some(handle) = state.actor_for(session_id) else {
        let _ = send_message(&mut socket, &ServerMessage::error(format!("no live session {session_id}"))).await;
        return;
    };

    if send_message(&mut socket, &ServerMessage::connected()).await.is_err() {
        return;
    }

    while let Some(result) = socket.recv().await {
        let message = match result {
            Ok(message) => message,
            Err(error) => {
                tracing::debug!("websocket receive error: {error}");
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_message) => {
                    if handle_client_message(&mut socket, &handle, client_message).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    let server_message = ServerMessage::error(format!("invalid message: {error}"));
                    if send_message(&mut socket, &server_message).await.is_err() {
                        break;
                    }
                }
            },
            Message::Close(_) => break,
            Message::Ping(data) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            _ => {}
        }
    }
}

async fn handle_client_message(
    socket: &mut WebSocket,
    handle: &crate::actor::SessionHandle,
    message: ClientMessage,
) -> Result<(), axum::Error> {
    match message {
        ClientMessage::Turn { student_text, response_time_ms } => {
            match handle.process_response(student_text, response_time_ms).await {
                Ok(outcome) => {
                    if let Some(ai_message) = &outcome.ai_message {
                        let reply = ServerMessage::AiMessage {
                            role: ai_message.role.to_string(),
                            content: ai_message.content.clone(),
                        };
                        send_message(socket, &reply).await?;
                    }
                    send_message(socket, &ServerMessage::turn_end(outcome.status, &outcome.decision)).await?;
                }
                Err(error) => {
                    send_message(socket, &ServerMessage::error(error.to_string())).await?;
                }
            }
        }
        ClientMessage::RetryLastAi => match handle.retry_last_ai().await {
            Ok(()) => send_message(socket, &ServerMessage::connected()).await?,
            Err(error) => send_message(socket, &ServerMessage::error(error.to_string())).await?,
        },
        ClientMessage::RequestGrade => match handle.calculate_final_grade().await {
            Ok(payload) => send_message(socket, &ServerMessage::Grade(payload)).await?,
            Err(error) => send_message(socket, &ServerMessage::error(error.to_string())).await?,
        },
        ClientMessage::Ping => {
            send_message(socket, &ServerMessage::Pong).await?;
        }
    }

    Ok(())
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let json = message.to_json();
    socket.send(Message::Text(json.into())).await
}
