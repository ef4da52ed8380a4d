#[macro_use]
extern crate tracing;

use std::{
  net::SocketAddr, str::FromStr, sync::Arc, time::Duration,
};

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};

use crate::{
  config::CoreConfig, docker::DockerEngine, state::App,
};

mod api;
mod auth;
mod config;
mod deployment;
mod docker;
mod error;
mod helpers;
mod job;
mod state;

/// How long in-flight jobs get to finish on shutdown.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

async fn app() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  let config = CoreConfig::from_env()?;
  logger::init(config.log_level)?;

  info!("Krane version: v{}", env!("CARGO_PKG_VERSION"));
  info!("{:?}", config.sanitized());

  let store = store::Store::open(&config.db_path)
    .context("failed to open store")?;
  let engine = DockerEngine::connect().await?;
  let state =
    Arc::new(App::new(config, store, Arc::new(engine))?);

  // The deployment network and the proxy fronting it must be up
  // before any request is served.
  state
    .engine
    .ensure_network(docker::NETWORK)
    .await
    .context("unable to create krane network")?;
  deployment::proxy::ensure(&state).await?;

  let router = api::router(state.clone()).layer(
    CorsLayer::new()
      .allow_origin(Any)
      .allow_methods(Any)
      .allow_headers(Any),
  );

  let addr = format!("0.0.0.0:{}", state.config.rest_port);
  let socket_addr = SocketAddr::from_str(&addr)
    .context("failed to parse listen address")?;
  info!("Krane starting on http://{socket_addr}");

  let server = axum_server::bind(socket_addr)
    .serve(router.into_make_service());
  let mut term_signal = tokio::signal::unix::signal(
    tokio::signal::unix::SignalKind::terminate(),
  )?;

  let result = tokio::select! {
    result = server => result.context("failed to start http server"),
    _ = term_signal.recv() => Ok(()),
    _ = tokio::signal::ctrl_c() => Ok(()),
  };

  // Drain in-flight jobs, then make sure all state hits disk.
  state.jobs.stop(SHUTDOWN_DEADLINE).await;
  state.store.flush().context("failed to flush store")?;

  result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  app().await
}
