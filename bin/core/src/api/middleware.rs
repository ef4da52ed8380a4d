use axum::{
  extract::{Request, State},
  http::header,
  middleware::Next,
  response::Response,
};

use crate::{
  auth,
  error::{Error, Result},
  state::AppState,
};

/// Require a valid bearer session on the request. The session is
/// looked up by the token's jti claim and must pass validity
/// checks, including expiry.
pub async fn require_session(
  State(state): State<AppState>,
  request: Request,
  next: Next,
) -> Result<Response> {
  let token = request
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.strip_prefix("Bearer "))
    .ok_or(Error::Unauthorized)?;
  auth::authenticate_bearer(&state, token)?;
  Ok(next.run(request).await)
}
