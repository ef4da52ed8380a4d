use axum::{
  Router,
  routing::{delete, get, post, put},
};
use serde_json::json;

use crate::state::AppState;

mod auth;
mod containers;
mod deployments;
mod jobs;
mod middleware;
mod response;
mod sessions;

use response::ApiResponse;

pub fn router(state: AppState) -> Router {
  let open = Router::new()
    .route("/health", post(health))
    .route("/login", get(auth::login))
    .route("/auth", post(auth::authenticate))
    .route("/containers/{id}/events", get(containers::events));

  let authed = Router::new()
    .route("/sessions", get(sessions::list))
    .route("/sessions/{id}", delete(sessions::delete))
    .route(
      "/deployments",
      get(deployments::list).post(deployments::create),
    )
    .route(
      "/deployments/{name}",
      get(deployments::get).delete(deployments::delete),
    )
    .route("/deployments/{name}/run", post(deployments::run))
    .route("/deployments/{name}/stop", post(deployments::stop))
    .route("/jobs/{id}", get(jobs::get))
    .route("/containers", get(containers::list))
    .route("/containers/{id}/stop", put(containers::stop))
    .route("/containers/{id}/start", put(containers::start))
    .route_layer(axum::middleware::from_fn_with_state(
      state.clone(),
      middleware::require_session,
    ));

  open.merge(authed).with_state(state)
}

async fn health() -> ApiResponse {
  ApiResponse::ok(json!({ "ok": true }))
}
