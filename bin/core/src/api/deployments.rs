use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::json;

use super::response::ApiResponse;
use crate::{
  deployment::{self, config::DeploymentConfig},
  error::{Error, Result},
  state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RunQuery {
  pub tag: Option<String>,
}

#[instrument(skip(state))]
pub async fn list(
  State(state): State<AppState>,
) -> Result<ApiResponse> {
  let deployments = deployment::config::list(&state.store)?;
  Ok(ApiResponse::ok(deployments))
}

#[instrument(skip(state))]
pub async fn get(
  State(state): State<AppState>,
  Path(name): Path<String>,
) -> Result<ApiResponse> {
  let config = deployment::config::load(&state.store, &name)?;
  Ok(ApiResponse::ok(config))
}

/// Save a deployment config and bring it up.
#[instrument(skip(state, body))]
pub async fn create(
  State(state): State<AppState>,
  Json(body): Json<serde_json::Value>,
) -> Result<ApiResponse> {
  let config: DeploymentConfig = serde_json::from_value(body)
    .map_err(|e| {
      Error::InvalidInput(format!(
        "invalid deployment config | {e}"
      ))
    })?;
  let job_id = deployment::start(&state, config)?;
  Ok(ApiResponse::ok(json!({ "job_id": job_id })))
}

/// Re-run a deployment, optionally at a different tag.
#[instrument(skip(state))]
pub async fn run(
  State(state): State<AppState>,
  Path(name): Path<String>,
  Query(query): Query<RunQuery>,
) -> Result<ApiResponse> {
  let job_id = deployment::run(&state, &name, query.tag)?;
  Ok(ApiResponse::ok(json!({ "job_id": job_id })))
}

/// Stop a deployment's containers without forgetting its config.
#[instrument(skip(state))]
pub async fn stop(
  State(state): State<AppState>,
  Path(name): Path<String>,
) -> Result<ApiResponse> {
  let job_id = deployment::stop(&state, &name)?;
  Ok(ApiResponse::ok(json!({ "job_id": job_id })))
}

/// Tear a deployment down and forget its config.
#[instrument(skip(state))]
pub async fn delete(
  State(state): State<AppState>,
  Path(name): Path<String>,
) -> Result<ApiResponse> {
  let job_id = deployment::delete(&state, &name)?;
  Ok(ApiResponse::ok(json!({ "job_id": job_id })))
}
