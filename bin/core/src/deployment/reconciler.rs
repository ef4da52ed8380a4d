//! The UP and DOWN procedures, run inside jobs.
//!
//! Both procedures treat the `krane.deployment` label as the only
//! source of truth for ownership: everything carrying the label
//! with the deployment's name belongs to it, everything else is
//! left alone.

use std::collections::HashMap;

use anyhow::{Context, anyhow};

use super::config::DeploymentConfig;
use crate::{
  docker::{
    ContainerFilter, ContainerSpec, DEPLOYMENT_LABEL,
    EngineError, NETWORK, STOP_TIMEOUT,
  },
  helpers,
  state::App,
};

/// Bring a deployment up to its desired scale. Existing containers
/// are replaced wholesale: the new generation is created and
/// started first, then the previous one is removed. A failure
/// partway through rolls everything back before the error
/// surfaces.
pub async fn up(
  state: &App,
  config: &DeploymentConfig,
) -> anyhow::Result<()> {
  let network_id = state
    .engine
    .ensure_network(NETWORK)
    .await
    .context("failed to ensure krane network")?;

  let current = state
    .engine
    .list_containers(ContainerFilter::Deployment(&config.name))
    .await
    .context("failed to list current containers")?;

  for index in 0..config.scale {
    if let Err(e) =
      create_and_start(state, config, &network_id, index).await
    {
      warn!(
        "rolling back deployment {} | {e:#}",
        config.name
      );
      if let Err(down_err) = down(state, &config.name).await {
        error!(
          "rollback of {} failed | {down_err:#}",
          config.name
        );
      }
      return Err(e);
    }
  }

  // Removal of the previous generation is best effort across the
  // whole set; one bad container must not strand the rest.
  let mut left_behind = Vec::new();
  for container in current {
    if let Err(e) = state
      .engine
      .stop_container(&container.id, STOP_TIMEOUT)
      .await
    {
      warn!(
        "failed to stop replaced container {} | {e}",
        container.id
      );
    }
    if let Err(e) = remove(state, &container.id).await {
      warn!(
        "failed to remove replaced container {} | {e:#}",
        container.id
      );
      left_behind.push(container.id);
    }
  }
  if !left_behind.is_empty() {
    return Err(anyhow!(
      "replaced containers left behind: {}",
      left_behind.join(", ")
    ));
  }

  info!(
    "deployment {} up at scale {}",
    config.name, config.scale
  );
  Ok(())
}

/// Stop and remove every container belonging to the deployment,
/// confirming by re-list that nothing with the label is left.
pub async fn down(
  state: &App,
  namespace: &str,
) -> anyhow::Result<()> {
  let current = state
    .engine
    .list_containers(ContainerFilter::Deployment(namespace))
    .await
    .context("failed to list containers")?;

  for container in &current {
    // Failures here are not fatal on their own; every container
    // gets its attempt, and the re-list below decides whether the
    // teardown actually finished.
    if let Err(e) = state
      .engine
      .stop_container(&container.id, STOP_TIMEOUT)
      .await
    {
      warn!(
        "failed to stop container {} | {e}",
        container.id
      );
    }
    if let Err(e) = remove(state, &container.id).await {
      warn!(
        "failed to remove container {} | {e:#}",
        container.id
      );
    }
  }

  let remaining = state
    .engine
    .list_containers(ContainerFilter::Deployment(namespace))
    .await
    .context("failed to confirm teardown")?;
  if !remaining.is_empty() {
    return Err(anyhow!(
      "{} containers still present after teardown of {namespace}",
      remaining.len()
    ));
  }
  info!("deployment {namespace} down");
  Ok(())
}

async fn create_and_start(
  state: &App,
  config: &DeploymentConfig,
  network_id: &str,
  index: u32,
) -> anyhow::Result<String> {
  let name = format!(
    "{}-{}-{}",
    config.name,
    index,
    helpers::short_suffix()
  );
  let spec = container_spec(config, network_id, name)?;
  let id =
    state.engine.create_container(spec).await.with_context(
      || {
        format!(
          "failed to create container {index} for {}",
          config.name
        )
      },
    )?;
  state.engine.start_container(&id).await.with_context(|| {
    format!(
      "failed to start container {index} for {}",
      config.name
    )
  })?;
  Ok(id)
}

async fn remove(state: &App, id: &str) -> anyhow::Result<()> {
  match state.engine.remove_container(id, true).await {
    // Already gone is as good as removed.
    Ok(()) | Err(EngineError::NotFound(_)) => Ok(()),
    Err(e) => Err(e.into()),
  }
}

fn container_spec(
  config: &DeploymentConfig,
  network_id: &str,
  name: String,
) -> anyhow::Result<ContainerSpec> {
  let mut ports = HashMap::new();
  for (host, container) in &config.ports {
    let host = host
      .parse::<u16>()
      .with_context(|| format!("invalid host port {host}"))?;
    let container = container.parse::<u16>().with_context(
      || format!("invalid container port {container}"),
    )?;
    ports.insert(host, container);
  }
  Ok(ContainerSpec {
    name,
    image: config.image_ref(),
    env: config
      .env
      .iter()
      .map(|(key, value)| format!("{key}={value}"))
      .collect(),
    labels: HashMap::from([(
      DEPLOYMENT_LABEL.to_string(),
      config.name.clone(),
    )]),
    volumes: config.volumes.clone(),
    ports,
    aliases: config.aliases.clone(),
    network_id: network_id.to_string(),
    command: config.command.clone(),
    entrypoint: config.entrypoint.clone(),
  })
}
