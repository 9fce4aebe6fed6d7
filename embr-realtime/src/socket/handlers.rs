use std::sync::Arc;

use serde::{Deserialize, Serialize};
use socketioxide::extract::{Data, SocketRef};
use uuid::Uuid;

use embr_shared::errors::AppError;

use crate::models::MessageKind;
use crate::registry::ConnId;
use crate::socket::connection::SocketConnection;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorPayload {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::Known { code, .. } => code.code(),
            AppError::Validation(_) => "E0002",
            AppError::Internal(_) | AppError::Database(_) => "E0001",
        };
        Self {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    match_id: Uuid,
    content: Option<String>,
    media_url: Option<String>,
    kind: Option<MessageKind>,
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    match_id: Uuid,
}

fn get_user_id(socket: &SocketRef) -> Option<Uuid> {
    socket.extensions.get::<Uuid>()
}

fn conn_id(socket: &SocketRef) -> ConnId {
    ConnId::from(socket.id.to_string())
}

fn emit_error(socket: &SocketRef, context: &str, err: &AppError) {
    tracing::warn!(sid = %socket.id, context = context, error = %err, "socket operation failed");
    let _ = socket.emit("error", &ErrorPayload::from(err));
}

pub async fn on_connect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match authenticate_socket(&socket, &state) {
        Ok(id) => id,
        Err(msg) => {
            tracing::warn!(sid = %socket.id, error = %msg, "socket auth failed");
            let _ = socket.emit(
                "error",
                &ErrorPayload {
                    code: "AUTH_FAILED".into(),
                    message: msg,
                },
            );
            socket.disconnect().ok();
            return;
        }
    };

    socket.extensions.insert(user_id);

    // registration is the online signal; presence fanout hangs off the
    // registry's transition stream
    let conn = Arc::new(SocketConnection::new(socket.clone()));
    state.registry.register(user_id, conn);

    tracing::info!(user_id = %user_id, sid = %socket.id, "socket connected");

    let _ = socket.emit("connected", &serde_json::json!({ "user_id": user_id }));

    socket.on("SendMessage", {
        let state = state.clone();
        move |socket: SocketRef, Data::<SendMessagePayload>(payload)| {
            let state = state.clone();
            async move { on_send_message(socket, payload, &state); }
        }
    });

    socket.on("MarkRead", {
        let state = state.clone();
        move |socket: SocketRef, Data::<MatchPayload>(payload)| {
            let state = state.clone();
            async move { on_mark_read(socket, payload, &state); }
        }
    });

    socket.on("StartTyping", {
        let state = state.clone();
        move |socket: SocketRef, Data::<MatchPayload>(payload)| {
            let state = state.clone();
            async move { on_typing(socket, payload, &state, true); }
        }
    });

    socket.on("StopTyping", {
        let state = state.clone();
        move |socket: SocketRef, Data::<MatchPayload>(payload)| {
            let state = state.clone();
            async move { on_typing(socket, payload, &state, false); }
        }
    });

    socket.on_disconnect({
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                on_disconnect_with_state(socket, state);
            }
        }
    });
}

fn on_disconnect_with_state(socket: SocketRef, state: Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    let went_offline = state.registry.unregister(user_id, &conn_id(&socket));
    tracing::info!(
        user_id = %user_id,
        sid = %socket.id,
        went_offline = went_offline,
        "socket disconnected"
    );
}

fn on_send_message(socket: SocketRef, payload: SendMessagePayload, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    // the sending socket already has the message client-side, so it is
    // excluded from the sender echo
    let origin = conn_id(&socket);
    if let Err(e) = state.messaging.send_message(
        user_id,
        payload.match_id,
        payload.content,
        payload.media_url,
        payload.kind,
        Some(&origin),
    ) {
        emit_error(&socket, "SendMessage", &e);
    }
}

fn on_mark_read(socket: SocketRef, payload: MatchPayload, state: &Arc<AppState>) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    if let Err(e) = state.messaging.mark_read(user_id, payload.match_id) {
        emit_error(&socket, "MarkRead", &e);
    }
}

fn on_typing(socket: SocketRef, payload: MatchPayload, state: &Arc<AppState>, typing: bool) {
    let user_id = match get_user_id(&socket) {
        Some(id) => id,
        None => return,
    };

    if let Err(e) = state.messaging.set_typing(user_id, payload.match_id, typing) {
        emit_error(&socket, "Typing", &e);
    }
}

fn authenticate_socket(socket: &SocketRef, state: &Arc<AppState>) -> Result<Uuid, String> {
    let connect_info = socket.req_parts();

    // Extract token from query string ?token=xxx
    let query = connect_info.uri.query().unwrap_or_default();
    let token = query
        .split('&')
        .find_map(|pair| {
            let mut split = pair.splitn(2, '=');
            let key = split.next()?;
            let value = split.next()?;
            if key == "token" {
                Some(value.to_string())
            } else {
                None
            }
        })
        .ok_or_else(|| "missing token query parameter".to_string())?;

    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = jsonwebtoken::decode::<embr_shared::types::auth::Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("invalid token: {e}"))?;

    if token_data.claims.is_expired() {
        return Err("token has expired".into());
    }

    Ok(token_data.claims.sub)
}
