//! In-memory engine stub used by reconciler and job tests.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
  ContainerEngine, ContainerFilter, ContainerRecord,
  ContainerSpec, ContainerState, DEPLOYMENT_LABEL, EngineError,
  LogStream,
};

#[derive(Default)]
struct MockState {
  containers: HashMap<String, ContainerRecord>,
  next_id: u64,
  /// Fail every create whose container name contains this needle.
  fail_create_containing: Option<String>,
  /// Fail this many start calls before succeeding.
  fail_start_times: u64,
  /// Fail every remove whose container name contains this needle.
  fail_remove_containing: Option<String>,
}

#[derive(Default)]
pub struct MockEngine {
  state: Mutex<MockState>,
}

impl MockEngine {
  pub fn new() -> Arc<MockEngine> {
    Arc::new(MockEngine::default())
  }

  pub fn fail_create_containing(&self, needle: &str) {
    self.state.lock().unwrap().fail_create_containing =
      Some(needle.to_string());
  }

  pub fn fail_starts(&self, times: u64) {
    self.state.lock().unwrap().fail_start_times = times;
  }

  pub fn fail_remove_containing(&self, needle: &str) {
    self.state.lock().unwrap().fail_remove_containing =
      Some(needle.to_string());
  }

  /// Plant a container record directly, bypassing create/start.
  pub fn insert_container(&self, record: ContainerRecord) {
    self
      .state
      .lock()
      .unwrap()
      .containers
      .insert(record.id.clone(), record);
  }
}

#[async_trait]
impl ContainerEngine for MockEngine {
  async fn ensure_network(
    &self,
    name: &str,
  ) -> Result<String, EngineError> {
    Ok(format!("{name}-network"))
  }

  async fn create_container(
    &self,
    spec: ContainerSpec,
  ) -> Result<String, EngineError> {
    let mut state = self.state.lock().unwrap();
    if let Some(needle) = &state.fail_create_containing {
      if spec.name.contains(needle.as_str()) {
        return Err(EngineError::Unavailable(String::from(
          "injected create failure",
        )));
      }
    }
    if state
      .containers
      .values()
      .any(|container| container.name == spec.name)
    {
      return Err(EngineError::NameConflict(spec.name));
    }
    state.next_id += 1;
    let id = format!("mock-{}", state.next_id);
    state.containers.insert(
      id.clone(),
      ContainerRecord {
        id: id.clone(),
        name: spec.name,
        image: spec.image,
        state: ContainerState::Created,
        labels: spec.labels,
        networks: vec![super::NETWORK.to_string()],
      },
    );
    Ok(id)
  }

  async fn start_container(
    &self,
    id: &str,
  ) -> Result<(), EngineError> {
    let mut state = self.state.lock().unwrap();
    if state.fail_start_times > 0 {
      state.fail_start_times -= 1;
      return Err(EngineError::Unavailable(String::from(
        "injected start failure",
      )));
    }
    match state.containers.get_mut(id) {
      Some(container) => {
        container.state = ContainerState::Running;
        Ok(())
      }
      None => Err(EngineError::NotFound(id.to_string())),
    }
  }

  async fn stop_container(
    &self,
    id: &str,
    _timeout: Duration,
  ) -> Result<(), EngineError> {
    let mut state = self.state.lock().unwrap();
    match state.containers.get_mut(id) {
      Some(container) => {
        container.state = ContainerState::Exited;
        Ok(())
      }
      None => Err(EngineError::NotFound(id.to_string())),
    }
  }

  async fn remove_container(
    &self,
    id: &str,
    _force: bool,
  ) -> Result<(), EngineError> {
    let mut state = self.state.lock().unwrap();
    if let Some(needle) = &state.fail_remove_containing {
      let stuck = state
        .containers
        .get(id)
        .is_some_and(|container| {
          container.name.contains(needle.as_str())
        });
      if stuck {
        return Err(EngineError::Unavailable(String::from(
          "injected remove failure",
        )));
      }
    }
    match state.containers.remove(id) {
      Some(_) => Ok(()),
      None => Err(EngineError::NotFound(id.to_string())),
    }
  }

  async fn inspect_container(
    &self,
    id: &str,
  ) -> Result<ContainerRecord, EngineError> {
    let state = self.state.lock().unwrap();
    state
      .containers
      .get(id)
      .cloned()
      .ok_or_else(|| EngineError::NotFound(id.to_string()))
  }

  async fn list_containers(
    &self,
    filter: ContainerFilter<'_>,
  ) -> Result<Vec<ContainerRecord>, EngineError> {
    let state = self.state.lock().unwrap();
    let mut containers = state
      .containers
      .values()
      .filter(|container| match filter {
        ContainerFilter::Deployment(name) => {
          container
            .labels
            .get(DEPLOYMENT_LABEL)
            .map(String::as_str)
            == Some(name)
        }
        ContainerFilter::Managed => {
          container.labels.contains_key(DEPLOYMENT_LABEL)
        }
      })
      .cloned()
      .collect::<Vec<_>>();
    containers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(containers)
  }

  async fn stream_logs(
    &self,
    id: &str,
  ) -> Result<LogStream, EngineError> {
    self.inspect_container(id).await?;
    let (tx, lines) = mpsc::channel(4);
    let _ = tx.send(Bytes::from_static(b"line one")).await;
    let _ = tx.send(Bytes::from_static(b"line two")).await;
    Ok(LogStream {
      lines,
      stop: CancellationToken::new(),
    })
  }
}
