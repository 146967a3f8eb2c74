//! Call Handlers

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;

use crate::application::services::CallSummary;
use crate::presentation::middleware::AuthUser;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct ActiveCallsResponse {
    pub calls: Vec<CallSummary>,
}

/// List the authenticated user's ringing and in-progress calls
pub async fn get_active_calls(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Json<ActiveCallsResponse> {
    Json(ActiveCallsResponse {
        calls: state.core.calls.active_calls_for(auth.user_id),
    })
}
