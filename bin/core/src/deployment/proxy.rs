use std::collections::HashMap;

use anyhow::Context;

use super::config::DeploymentConfig;
use crate::{docker::ContainerFilter, state::AppState};

/// Name of the built-in reverse proxy deployment.
pub const PROXY_NAME: &str = "krane-proxy";

const PROXY_IMAGE: &str = "biensupernice/proxy";

fn proxy_config(state: &AppState) -> DeploymentConfig {
  DeploymentConfig {
    name: PROXY_NAME.to_string(),
    image: PROXY_IMAGE.to_string(),
    scale: 1,
    secured: state.config.proxy_dashboard_secure,
    aliases: state
      .config
      .proxy_dashboard_alias
      .clone()
      .into_iter()
      .collect(),
    volumes: HashMap::from([(
      String::from("/var/run/docker.sock"),
      String::from("/var/run/docker.sock"),
    )]),
    ports: HashMap::from([
      (String::from("80"), String::from("80")),
      (String::from("443"), String::from("443")),
      (String::from("8080"), String::from("8080")),
    ]),
    ..Default::default()
  }
}

/// Make sure the reverse proxy fronting all deployments is up.
/// Called at boot; a proxy that cannot be scheduled is fatal.
pub async fn ensure(state: &AppState) -> anyhow::Result<()> {
  let containers = state
    .engine
    .list_containers(ContainerFilter::Deployment(PROXY_NAME))
    .await
    .context("unable to inspect network proxy state")?;
  if containers.iter().any(|container| container.running()) {
    debug!("network proxy running");
    return Ok(());
  }
  let job_id = super::start(state, proxy_config(state))
    .context("unable to schedule network proxy deployment")?;
  debug!("network proxy deployment started | job {job_id}");
  Ok(())
}
