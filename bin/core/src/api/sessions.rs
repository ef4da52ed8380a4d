use axum::extract::{Path, State};
use serde_json::json;

use super::response::ApiResponse;
use crate::{auth::session, error::Result, state::AppState};

#[instrument(skip(state))]
pub async fn list(
  State(state): State<AppState>,
) -> Result<ApiResponse> {
  let sessions = session::list(&state.store)?;
  Ok(ApiResponse::ok(sessions))
}

/// Logout: revoke one session.
#[instrument(skip(state))]
pub async fn delete(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<ApiResponse> {
  session::delete(&state.store, &id)?;
  Ok(ApiResponse::ok(
    json!({ "message": format!("Session {id} revoked") }),
  ))
}
