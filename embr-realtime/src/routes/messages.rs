use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use embr_shared::errors::AppResult;
use embr_shared::types::api::ApiResponse;
use embr_shared::types::auth::AuthUser;
use embr_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::{Message, MessageKind};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub kind: Option<MessageKind>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub match_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// GET /matches/:id/messages - paginated message history, newest first
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Message>>>> {
    let (items, total) = state.messaging.list_messages(
        auth_user.id,
        match_id,
        params.limit() as i64,
        params.offset() as i64,
    )?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total as u64, &params))))
}

/// POST /matches/:id/messages - send a message in a match
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> AppResult<Json<ApiResponse<Message>>> {
    // no originating connection over HTTP, so every sender device gets the echo
    let message = state.messaging.send_message(
        auth_user.id,
        match_id,
        req.content,
        req.media_url,
        req.kind,
        None,
    )?;

    Ok(Json(ApiResponse::ok(message)))
}

/// POST /matches/:id/read - mark every message addressed to the caller as read
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MarkReadResponse>>> {
    let message_ids = state.messaging.mark_read(auth_user.id, match_id)?;

    Ok(Json(ApiResponse::ok(MarkReadResponse { match_id, message_ids })))
}
