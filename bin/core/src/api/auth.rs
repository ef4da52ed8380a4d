use axum::{Json, extract::State};
use serde::Deserialize;

use super::response::ApiResponse;
use crate::{
  auth,
  error::{Error, Result},
  state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
  pub request_id: String,
  pub token: String,
}

/// Hand out a phrase the client must sign with its private ssh
/// key.
#[instrument(skip(state))]
pub async fn login(
  State(state): State<AppState>,
) -> Result<ApiResponse> {
  let challenge = auth::request_login(&state)?;
  Ok(ApiResponse::ok(challenge))
}

/// Exchange a signed phrase for a session token.
#[instrument(skip_all)]
pub async fn authenticate(
  State(state): State<AppState>,
  Json(body): Json<serde_json::Value>,
) -> Result<ApiResponse> {
  let body: AuthRequest = serde_json::from_value(body)
    .map_err(|e| {
      Error::InvalidInput(format!("invalid auth request | {e}"))
    })?;
  let grant =
    auth::authenticate(&state, &body.request_id, &body.token)?;
  Ok(ApiResponse::ok(grant))
}
