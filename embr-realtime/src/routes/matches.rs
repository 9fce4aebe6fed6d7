use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use embr_shared::errors::AppResult;
use embr_shared::types::api::ApiResponse;
use embr_shared::types::auth::AuthUser;

use crate::models::ProfileSnapshot;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub matched_at: DateTime<Utc>,
    pub peer: Option<ProfileSnapshot>,
}

/// GET /matches - list the authenticated user's matches, newest first
pub async fn list_matches(
    auth_user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<MatchSummary>>>> {
    let matches = state.store.matches_for(auth_user.id)?;

    let mut summaries = Vec::with_capacity(matches.len());
    for m in matches {
        // a peer whose profile row is gone still shows up as a match
        let peer = state.store.profile_snapshot(m.other(auth_user.id))?;
        summaries.push(MatchSummary {
            match_id: m.id,
            matched_at: m.created_at,
            peer,
        });
    }

    Ok(Json(ApiResponse::ok(summaries)))
}
