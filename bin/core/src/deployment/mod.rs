//! Deployment lifecycle operations.
//!
//! Request handlers call into this module; the container work
//! itself always goes through the job engine so handlers return as
//! soon as the job is queued.

use std::sync::Arc;

use crate::{
  error::{Error, Result},
  helpers,
  job::{Job, JobArgs, JobKind},
  state::AppState,
};

pub mod config;
pub mod proxy;
pub mod reconciler;

use config::DeploymentConfig;

/// Attempts made for each deployment job before it is marked
/// failed.
const RETRY_POLICY: u32 = 3;

/// Persist the config and queue a job bringing the deployment up.
/// Returns the job id.
pub fn start(
  state: &AppState,
  config: DeploymentConfig,
) -> Result<String> {
  let config = config::save(&state.store, config)?;
  let job = up_job(state.clone(), config);
  Ok(state.jobs.enqueue(job)?)
}

/// Re-run a persisted deployment, optionally moving it to a new
/// tag first.
pub fn run(
  state: &AppState,
  name: &str,
  tag: Option<String>,
) -> Result<String> {
  let mut config = config::load(&state.store, name)?;
  if let Some(tag) = tag {
    config.tag = tag;
  }
  let config = config::save(&state.store, config)?;
  let job = up_job(state.clone(), config);
  Ok(state.jobs.enqueue(job)?)
}

/// Queue a job stopping and removing the deployment's containers.
/// The config stays in the store.
pub fn stop(state: &AppState, name: &str) -> Result<String> {
  if !config::exists(&state.store, name)? {
    return Err(Error::NotFound(format!("deployment {name}")));
  }
  let job = down_job(state.clone(), name.to_string(), false);
  Ok(state.jobs.enqueue(job)?)
}

/// Queue a job tearing the deployment down. The config is deleted
/// once the teardown succeeds.
pub fn delete(state: &AppState, name: &str) -> Result<String> {
  if !config::exists(&state.store, name)? {
    return Err(Error::NotFound(format!("deployment {name}")));
  }
  let job = down_job(state.clone(), name.to_string(), true);
  Ok(state.jobs.enqueue(job)?)
}

fn up_job(state: AppState, config: DeploymentConfig) -> Job {
  Job {
    id: helpers::make_identifier(),
    namespace: config.name.clone(),
    kind: JobKind::ContainerCreate,
    args: JobArgs::ContainerCreate { config },
    retry_policy: RETRY_POLICY,
    run: Arc::new(move |args| {
      let state = state.clone();
      Box::pin(async move {
        let JobArgs::ContainerCreate { config } = args else {
          anyhow::bail!(
            "container create job handed mismatched args"
          );
        };
        reconciler::up(&state, &config).await
      })
    }),
  }
}

fn down_job(
  state: AppState,
  namespace: String,
  delete_config: bool,
) -> Job {
  Job {
    id: helpers::make_identifier(),
    namespace: namespace.clone(),
    kind: JobKind::ContainerDelete,
    args: JobArgs::ContainerDelete { namespace },
    retry_policy: RETRY_POLICY,
    run: Arc::new(move |args| {
      let state = state.clone();
      Box::pin(async move {
        let JobArgs::ContainerDelete { namespace } = args else {
          anyhow::bail!(
            "container delete job handed mismatched args"
          );
        };
        reconciler::down(&state, &namespace).await?;
        if delete_config {
          config::delete(&state.store, &namespace)?;
        }
        Ok(())
      })
    }),
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;
  use crate::{
    docker::{
      ContainerEngine, ContainerFilter, ContainerRecord,
      ContainerState, DEPLOYMENT_LABEL, mock::MockEngine,
    },
    job::{JobState, wait_terminal},
    state::test::test_app_with,
  };

  fn api_config(scale: u32) -> DeploymentConfig {
    DeploymentConfig {
      name: String::from("api"),
      image: String::from("nginx"),
      scale,
      ..Default::default()
    }
  }

  async fn containers_of(
    engine: &MockEngine,
    name: &str,
  ) -> Vec<ContainerRecord> {
    engine
      .list_containers(ContainerFilter::Deployment(name))
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn up_creates_and_starts_to_scale() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(2)).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);

    let containers = containers_of(&engine, "api").await;
    assert_eq!(containers.len(), 2);
    for container in &containers {
      assert!(container.running());
      assert_eq!(
        container.labels.get(DEPLOYMENT_LABEL),
        Some(&String::from("api"))
      );
      assert_eq!(
        container.labels.len(),
        1,
        "exactly one ownership label"
      );
      assert_eq!(container.image, "docker.io/nginx:latest");
    }
  }

  #[tokio::test]
  async fn redeploy_replaces_the_previous_generation() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(2)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;
    let first = containers_of(&engine, "api").await;

    let job_id = start(&state, api_config(1)).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);

    let second = containers_of(&engine, "api").await;
    assert_eq!(second.len(), 1);
    // The survivors are new containers, not leftovers.
    for old in first {
      assert!(second.iter().all(|c| c.id != old.id));
    }
  }

  #[tokio::test]
  async fn partial_create_failure_rolls_back() {
    let engine = MockEngine::new();
    // Third replica can never be created.
    engine.fail_create_containing("api-2-");
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(3)).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.last_error.is_some());
    assert_eq!(status.execution_count, RETRY_POLICY);

    assert!(containers_of(&engine, "api").await.is_empty());
  }

  #[tokio::test]
  async fn transient_start_failure_is_retried() {
    let engine = MockEngine::new();
    engine.fail_starts(1);
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(1)).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);
    assert_eq!(status.execution_count, 2);
    assert_eq!(status.failure_count, 1);
    assert!(status.execution_count <= RETRY_POLICY);

    let containers = containers_of(&engine, "api").await;
    assert_eq!(containers.len(), 1);
    assert!(containers[0].running());
  }

  #[tokio::test]
  async fn down_leaves_no_labelled_containers() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(2)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;

    let job_id = stop(&state, "api").unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);
    assert!(containers_of(&engine, "api").await.is_empty());

    // Stopping does not forget the deployment.
    assert!(config::exists(&state.store, "api").unwrap());
  }

  #[tokio::test]
  async fn down_attempts_every_container_when_one_removal_fails()
  {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(3)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;

    // First replica can never be removed.
    engine.fail_remove_containing("api-0-");

    let job_id = stop(&state, "api").unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(
      status.last_error.unwrap().contains("still present")
    );

    // The stuck container is the only survivor; the other two
    // were still attempted and removed behind it.
    let remaining = containers_of(&engine, "api").await;
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].name.contains("api-0-"));
  }

  #[tokio::test]
  async fn replace_attempts_every_container_when_one_removal_fails()
  {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(2)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;
    let first = containers_of(&engine, "api").await;
    let stuck = first[0].clone();

    // Pin the failure to one exact old container so the fresh
    // generation is unaffected.
    engine.fail_remove_containing(&stuck.name);

    let job_id = start(&state, api_config(1)).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(
      status.last_error.unwrap().contains("left behind")
    );

    // The stuck container plus the latest replica survive; the
    // other old container was still attempted and removed.
    let remaining = containers_of(&engine, "api").await;
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().any(|c| c.id == stuck.id));
    assert!(remaining.iter().all(|c| c.id != first[1].id));
  }

  #[tokio::test]
  async fn namespace_exists_until_deleted() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(1)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;
    assert!(config::exists(&state.store, "api").unwrap());

    let job_id = stop(&state, "api").unwrap();
    wait_terminal(&state.jobs, &job_id).await;
    assert!(config::exists(&state.store, "api").unwrap());

    let job_id = delete(&state, "api").unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);
    assert!(!config::exists(&state.store, "api").unwrap());
  }

  #[tokio::test]
  async fn stopping_an_unknown_deployment_is_not_found() {
    let state = test_app_with(MockEngine::new());
    assert!(matches!(
      stop(&state, "ghost"),
      Err(Error::NotFound(_))
    ));
    assert!(matches!(
      delete(&state, "ghost"),
      Err(Error::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn run_overrides_the_tag() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    let job_id = start(&state, api_config(1)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;

    let job_id =
      run(&state, "api", Some(String::from("1.27"))).unwrap();
    let status = wait_terminal(&state.jobs, &job_id).await;
    assert_eq!(status.state, JobState::Succeeded);

    let stored = config::load(&state.store, "api").unwrap();
    assert_eq!(stored.tag, "1.27");
    let containers = containers_of(&engine, "api").await;
    assert_eq!(containers[0].image, "docker.io/nginx:1.27");
  }

  #[tokio::test]
  async fn foreign_containers_are_never_touched() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());
    engine.insert_container(ContainerRecord {
      id: String::from("foreign-1"),
      name: String::from("hand-rolled"),
      image: String::from("redis"),
      state: ContainerState::Running,
      labels: HashMap::new(),
      networks: Vec::new(),
    });

    let job_id = start(&state, api_config(1)).unwrap();
    wait_terminal(&state.jobs, &job_id).await;
    let job_id = delete(&state, "api").unwrap();
    wait_terminal(&state.jobs, &job_id).await;

    assert!(
      engine.inspect_container("foreign-1").await.is_ok(),
      "unlabelled container must survive deployment churn"
    );
  }

  #[tokio::test]
  async fn proxy_is_scheduled_when_not_running() {
    let engine = MockEngine::new();
    let state = test_app_with(engine.clone());

    proxy::ensure(&state).await.unwrap();

    let deadline = std::time::Instant::now()
      + std::time::Duration::from_secs(5);
    loop {
      let containers =
        containers_of(&engine, proxy::PROXY_NAME).await;
      if containers.iter().any(|c| c.running()) {
        break;
      }
      assert!(std::time::Instant::now() < deadline);
      tokio::time::sleep(std::time::Duration::from_millis(10))
        .await;
    }

    // Idempotent once the proxy is up.
    proxy::ensure(&state).await.unwrap();
    assert_eq!(
      containers_of(&engine, proxy::PROXY_NAME).await.len(),
      1
    );
  }
}
