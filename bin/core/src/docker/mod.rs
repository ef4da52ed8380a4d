use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod engine;
#[cfg(test)]
pub mod mock;

pub use engine::DockerEngine;

/// Label marking a container as owned by a krane deployment. The
/// label value is the deployment name. A container without this
/// label is foreign and is never touched.
pub const DEPLOYMENT_LABEL: &str = "krane.deployment";

/// The bridge network all krane containers attach to.
pub const NETWORK: &str = "krane";

/// How long a container gets to exit on its own before the engine
/// kills it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  #[error("container engine unreachable | {0}")]
  Unavailable(String),
  #[error("no such container: {0}")]
  NotFound(String),
  #[error("name already in use: {0}")]
  NameConflict(String),
  #[error("invalid container spec | {0}")]
  InvalidSpec(String),
  #[error("engine call timed out after {0:?}")]
  Timeout(Duration),
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
  pub name: String,
  /// Fully qualified image reference (`registry/image:tag`).
  pub image: String,
  /// `KEY=VALUE` pairs.
  pub env: Vec<String>,
  pub labels: HashMap<String, String>,
  /// host path -> container path
  pub volumes: HashMap<String, String>,
  /// host port -> container port
  pub ports: HashMap<u16, u16>,
  pub aliases: Vec<String>,
  pub network_id: String,
  pub command: Vec<String>,
  pub entrypoint: Vec<String>,
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
  Created,
  Running,
  Paused,
  Restarting,
  Exited,
  Dead,
  #[default]
  #[serde(other)]
  Unknown,
}

/// The slice of engine container state the reconciler diffs on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerRecord {
  pub id: String,
  pub name: String,
  pub image: String,
  pub state: ContainerState,
  #[serde(default)]
  pub labels: HashMap<String, String>,
  #[serde(default)]
  pub networks: Vec<String>,
}

impl ContainerRecord {
  pub fn running(&self) -> bool {
    self.state == ContainerState::Running
  }
}

/// Which containers to list.
#[derive(Debug, Clone, Copy)]
pub enum ContainerFilter<'a> {
  /// Containers of one deployment (`krane.deployment=<name>`).
  Deployment(&'a str),
  /// Every krane-managed container (`krane.deployment` present).
  Managed,
}

/// Follow-mode log tail of one container. Each received chunk is one
/// log line with the engine framing already stripped. Cancelling
/// `stop` (or dropping the receiver) ends the engine-side read loop.
pub struct LogStream {
  pub lines: mpsc::Receiver<Bytes>,
  pub stop: CancellationToken,
}

/// The contract the reconciler holds against the container engine.
/// Implemented by [`DockerEngine`] for the docker daemon, and by an
/// in-memory stub in tests.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
  /// Idempotently create the named bridge network, returning its
  /// id.
  async fn ensure_network(
    &self,
    name: &str,
  ) -> Result<String, EngineError>;

  /// Create a container, failing cleanly if the name is taken.
  /// Returns the engine-assigned id.
  async fn create_container(
    &self,
    spec: ContainerSpec,
  ) -> Result<String, EngineError>;

  async fn start_container(
    &self,
    id: &str,
  ) -> Result<(), EngineError>;

  async fn stop_container(
    &self,
    id: &str,
    timeout: Duration,
  ) -> Result<(), EngineError>;

  async fn remove_container(
    &self,
    id: &str,
    force: bool,
  ) -> Result<(), EngineError>;

  async fn inspect_container(
    &self,
    id: &str,
  ) -> Result<ContainerRecord, EngineError>;

  async fn list_containers(
    &self,
    filter: ContainerFilter<'_>,
  ) -> Result<Vec<ContainerRecord>, EngineError>;

  async fn stream_logs(
    &self,
    id: &str,
  ) -> Result<LogStream, EngineError>;
}
