use axum::extract::{Path, State};

use super::response::ApiResponse;
use crate::{
  error::{Error, Result},
  state::AppState,
};

/// Status of one job, including terminal failures that never
/// surface on the submission call.
#[instrument(skip(state))]
pub async fn get(
  State(state): State<AppState>,
  Path(id): Path<String>,
) -> Result<ApiResponse> {
  let status = state
    .jobs
    .status(&id)
    .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
  Ok(ApiResponse::ok(status))
}
