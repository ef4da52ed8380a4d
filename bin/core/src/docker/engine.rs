use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use bollard::{
  Docker,
  models::{
    ContainerCreateBody, ContainerSummary, EndpointSettings,
    HostConfig, NetworkCreateRequest, NetworkingConfig,
    PortBinding,
  },
  query_parameters::{
    CreateContainerOptions, InspectContainerOptions,
    ListContainersOptions, ListNetworksOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
  },
  secret::{ContainerStateStatusEnum, ContainerSummaryStateEnum},
};
use futures::{Future, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
  ContainerEngine, ContainerFilter, ContainerRecord,
  ContainerSpec, ContainerState, DEPLOYMENT_LABEL, EngineError,
  LogStream, NETWORK,
};

const CREATE_DEADLINE: Duration = Duration::from_secs(60);
const STOP_DEADLINE: Duration = Duration::from_secs(60);
const REMOVE_DEADLINE: Duration = Duration::from_secs(90);
const INSPECT_DEADLINE: Duration = Duration::from_secs(5);

/// Lines of history replayed when a log tail is attached.
const LOG_TAIL: &str = "200";

pub struct DockerEngine {
  docker: Docker,
}

impl DockerEngine {
  /// Connect to the local docker daemon and verify it responds.
  pub async fn connect() -> anyhow::Result<DockerEngine> {
    let docker = Docker::connect_with_defaults()
      .context("failed to connect to docker daemon")?;
    tokio::time::timeout(INSPECT_DEADLINE, docker.ping())
      .await
      .context("docker daemon did not answer ping in time")?
      .context("docker daemon ping failed")?;
    Ok(DockerEngine { docker })
  }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
  async fn ensure_network(
    &self,
    name: &str,
  ) -> Result<String, EngineError> {
    let networks = self
      .docker
      .list_networks(Option::<ListNetworksOptions>::None)
      .await
      .map_err(|e| map_err(e, name))?;
    if let Some(id) = networks
      .into_iter()
      .find(|network| network.name.as_deref() == Some(name))
      .and_then(|network| network.id)
    {
      return Ok(id);
    }
    let created = self
      .docker
      .create_network(NetworkCreateRequest {
        name: name.to_string(),
        driver: Some(String::from("bridge")),
        ..Default::default()
      })
      .await
      .map_err(|e| map_err(e, name))?;
    Ok(created.id)
  }

  async fn create_container(
    &self,
    spec: ContainerSpec,
  ) -> Result<String, EngineError> {
    let name = spec.name.clone();
    let options = CreateContainerOptions {
      name: Some(name.clone()),
      ..Default::default()
    };
    let created = with_deadline(
      CREATE_DEADLINE,
      self.docker.create_container(Some(options), create_body(spec)),
      &name,
    )
    .await?;
    Ok(created.id)
  }

  async fn start_container(
    &self,
    id: &str,
  ) -> Result<(), EngineError> {
    with_deadline(
      CREATE_DEADLINE,
      self
        .docker
        .start_container(id, None::<StartContainerOptions>),
      id,
    )
    .await
  }

  async fn stop_container(
    &self,
    id: &str,
    timeout: Duration,
  ) -> Result<(), EngineError> {
    let options = StopContainerOptions {
      t: Some(timeout.as_secs() as i32),
      ..Default::default()
    };
    with_deadline(
      STOP_DEADLINE,
      self.docker.stop_container(id, Some(options)),
      id,
    )
    .await
  }

  async fn remove_container(
    &self,
    id: &str,
    force: bool,
  ) -> Result<(), EngineError> {
    let options = RemoveContainerOptions {
      force,
      v: true,
      ..Default::default()
    };
    with_deadline(
      REMOVE_DEADLINE,
      self.docker.remove_container(id, Some(options)),
      id,
    )
    .await
  }

  async fn inspect_container(
    &self,
    id: &str,
  ) -> Result<ContainerRecord, EngineError> {
    let container = with_deadline(
      INSPECT_DEADLINE,
      self
        .docker
        .inspect_container(id, None::<InspectContainerOptions>),
      id,
    )
    .await?;
    let config = container.config;
    Ok(ContainerRecord {
      id: container.id.unwrap_or_default(),
      name: container
        .name
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string(),
      image: config
        .as_ref()
        .and_then(|config| config.image.clone())
        .unwrap_or_default(),
      state: container
        .state
        .and_then(|state| state.status)
        .map(convert_status)
        .unwrap_or_default(),
      labels: config
        .and_then(|config| config.labels)
        .unwrap_or_default(),
      networks: container
        .network_settings
        .and_then(|settings| settings.networks)
        .map(sorted_keys)
        .unwrap_or_default(),
    })
  }

  async fn list_containers(
    &self,
    filter: ContainerFilter<'_>,
  ) -> Result<Vec<ContainerRecord>, EngineError> {
    let label = match filter {
      ContainerFilter::Deployment(name) => {
        format!("{DEPLOYMENT_LABEL}={name}")
      }
      ContainerFilter::Managed => DEPLOYMENT_LABEL.to_string(),
    };
    let options = ListContainersOptions {
      all: true,
      filters: Some(HashMap::from([(
        String::from("label"),
        vec![label],
      )])),
      ..Default::default()
    };
    let containers = self
      .docker
      .list_containers(Some(options))
      .await
      .map_err(|e| map_err(e, "containers"))?;
    Ok(containers.into_iter().map(convert_summary).collect())
  }

  async fn stream_logs(
    &self,
    id: &str,
  ) -> Result<LogStream, EngineError> {
    let options = LogsOptions {
      follow: true,
      stdout: true,
      stderr: true,
      timestamps: true,
      tail: LOG_TAIL.to_string(),
      ..Default::default()
    };
    let mut stream = self.docker.logs(id, Some(options));
    let (tx, lines) = mpsc::channel(64);
    let stop = CancellationToken::new();
    let cancel = stop.clone();
    let id = id.to_string();

    tokio::spawn(async move {
      loop {
        let chunk = tokio::select! {
          chunk = stream.next() => chunk,
          _ = cancel.cancelled() => break,
        };
        match chunk {
          Some(Ok(output)) => {
            if tx.send(output.into_bytes()).await.is_err() {
              break;
            }
          }
          Some(Err(e)) => {
            debug!("log stream for {id} ended | {e:?}");
            break;
          }
          None => break,
        }
      }
    });

    Ok(LogStream { lines, stop })
  }
}

fn create_body(spec: ContainerSpec) -> ContainerCreateBody {
  let mut exposed_ports: HashMap<String, HashMap<(), ()>> =
    HashMap::new();
  let mut port_bindings: HashMap<
    String,
    Option<Vec<PortBinding>>,
  > = HashMap::new();
  for (host, container) in &spec.ports {
    let container_port = format!("{container}/tcp");
    exposed_ports.insert(container_port.clone(), HashMap::new());
    port_bindings
      .entry(container_port)
      .or_insert_with(|| Some(Vec::new()))
      .get_or_insert_with(Vec::new)
      .push(PortBinding {
        host_ip: None,
        host_port: Some(host.to_string()),
      });
  }

  let binds = spec
    .volumes
    .iter()
    .map(|(host, container)| format!("{host}:{container}"))
    .collect::<Vec<_>>();

  ContainerCreateBody {
    hostname: Some(spec.name.clone()),
    image: Some(spec.image),
    env: Some(spec.env),
    labels: Some(spec.labels),
    exposed_ports: (!exposed_ports.is_empty())
      .then_some(exposed_ports),
    cmd: (!spec.command.is_empty()).then_some(spec.command),
    entrypoint: (!spec.entrypoint.is_empty())
      .then_some(spec.entrypoint),
    host_config: Some(HostConfig {
      binds: (!binds.is_empty()).then_some(binds),
      port_bindings: (!port_bindings.is_empty())
        .then_some(port_bindings),
      auto_remove: Some(false),
      ..Default::default()
    }),
    networking_config: Some(NetworkingConfig {
      endpoints_config: Some(HashMap::from([(
        NETWORK.to_string(),
        EndpointSettings {
          network_id: Some(spec.network_id),
          aliases: (!spec.aliases.is_empty())
            .then_some(spec.aliases),
          ..Default::default()
        },
      )])),
      ..Default::default()
    }),
    ..Default::default()
  }
}

fn convert_summary(container: ContainerSummary) -> ContainerRecord {
  ContainerRecord {
    id: container.id.unwrap_or_default(),
    name: container
      .names
      .unwrap_or_default()
      .pop()
      .unwrap_or_default()
      .trim_start_matches('/')
      .to_string(),
    image: container.image.unwrap_or_default(),
    state: container
      .state
      .map(convert_summary_state)
      .unwrap_or_default(),
    labels: container.labels.unwrap_or_default(),
    networks: container
      .network_settings
      .and_then(|settings| settings.networks)
      .map(sorted_keys)
      .unwrap_or_default(),
  }
}

fn sorted_keys<V>(map: HashMap<String, V>) -> Vec<String> {
  let mut keys = map.into_keys().collect::<Vec<_>>();
  keys.sort();
  keys
}

fn convert_summary_state(
  state: ContainerSummaryStateEnum,
) -> ContainerState {
  match state {
    ContainerSummaryStateEnum::CREATED => ContainerState::Created,
    ContainerSummaryStateEnum::RUNNING => ContainerState::Running,
    ContainerSummaryStateEnum::PAUSED => ContainerState::Paused,
    ContainerSummaryStateEnum::RESTARTING => {
      ContainerState::Restarting
    }
    ContainerSummaryStateEnum::EXITED => ContainerState::Exited,
    ContainerSummaryStateEnum::DEAD => ContainerState::Dead,
    _ => ContainerState::Unknown,
  }
}

fn convert_status(
  status: ContainerStateStatusEnum,
) -> ContainerState {
  match status {
    ContainerStateStatusEnum::CREATED => ContainerState::Created,
    ContainerStateStatusEnum::RUNNING => ContainerState::Running,
    ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
    ContainerStateStatusEnum::RESTARTING => {
      ContainerState::Restarting
    }
    ContainerStateStatusEnum::EXITED => ContainerState::Exited,
    ContainerStateStatusEnum::DEAD => ContainerState::Dead,
    _ => ContainerState::Unknown,
  }
}

async fn with_deadline<T>(
  deadline: Duration,
  call: impl Future<Output = Result<T, bollard::errors::Error>>,
  subject: &str,
) -> Result<T, EngineError> {
  match tokio::time::timeout(deadline, call).await {
    Ok(result) => result.map_err(|e| map_err(e, subject)),
    Err(_) => Err(EngineError::Timeout(deadline)),
  }
}

fn map_err(
  e: bollard::errors::Error,
  subject: &str,
) -> EngineError {
  match e {
    bollard::errors::Error::DockerResponseServerError {
      status_code: 404,
      ..
    } => EngineError::NotFound(subject.to_string()),
    bollard::errors::Error::DockerResponseServerError {
      status_code: 409,
      message,
    } => EngineError::NameConflict(message),
    bollard::errors::Error::DockerResponseServerError {
      status_code: 400,
      message,
    } => EngineError::InvalidSpec(message),
    e => EngineError::Unavailable(e.to_string()),
  }
}
