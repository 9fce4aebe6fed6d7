use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use embr_shared::errors::AppResult;
use embr_shared::types::api::ApiResponse;
use embr_shared::types::auth::AuthUser;

use crate::models::ProfileSnapshot;
use crate::services::matchmaking::SwipeOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SwipeRequest {
    pub target_id: Uuid,
    pub is_like: bool,
}

#[derive(Debug, Serialize)]
pub struct SwipeResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<ProfileSnapshot>,
}

/// POST /swipes - record a like or dislike on another profile
pub async fn record_swipe(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SwipeRequest>,
) -> AppResult<Json<ApiResponse<SwipeResponse>>> {
    let outcome = state
        .matchmaking
        .record_swipe(auth_user.id, req.target_id, req.is_like)?;

    let response = match outcome {
        SwipeOutcome::Created { match_id, peer } => SwipeResponse {
            status: "matched",
            match_id: Some(match_id),
            peer: Some(peer),
        },
        SwipeOutcome::Retracted => SwipeResponse {
            status: "retracted",
            match_id: None,
            peer: None,
        },
        SwipeOutcome::Unchanged => SwipeResponse {
            status: "recorded",
            match_id: None,
            peer: None,
        },
    };

    Ok(Json(ApiResponse::ok(response)))
}
