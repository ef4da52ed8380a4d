//! Asynchronous execution of container lifecycle work.
//!
//! Submissions go through [`JobEngine::enqueue`]; a fixed pool of
//! workers pulls jobs one at a time, retrying failed runs up to the
//! job's retry policy and recording per-job status throughout. Jobs
//! are not durable across restarts.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::deployment::config::DeploymentConfig;

mod engine;
mod worker;

pub use engine::{JobEngine, SubmitError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
  ContainerCreate,
  ContainerDelete,
}

/// Parameter bundle consumed by a job's run procedure. Tagged per
/// kind so a runner handed the wrong bundle fails outright instead
/// of misreading it.
#[derive(Debug, Clone)]
pub enum JobArgs {
  ContainerCreate { config: DeploymentConfig },
  ContainerDelete { namespace: String },
}

/// The procedure a worker invokes on each attempt.
pub type JobRunner = Arc<
  dyn Fn(JobArgs) -> BoxFuture<'static, anyhow::Result<()>>
    + Send
    + Sync,
>;

pub struct Job {
  pub id: String,
  /// The deployment this job targets.
  pub namespace: String,
  pub kind: JobKind,
  pub args: JobArgs,
  /// Upper bound on total attempts, at least 1.
  pub retry_policy: u32,
  pub run: JobRunner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
  Queued,
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
  pub job_id: String,
  pub namespace: String,
  pub kind: JobKind,
  pub state: JobState,
  pub start_time: Option<String>,
  pub end_time: Option<String>,
  /// Attempts actually made, never more than the retry policy.
  pub execution_count: u32,
  pub failure_count: u32,
  pub last_error: Option<String>,
}

/// Poll a job until it reaches a terminal state. Test helper.
#[cfg(test)]
pub async fn wait_terminal(
  engine: &JobEngine,
  job_id: &str,
) -> JobStatus {
  let deadline = std::time::Instant::now()
    + std::time::Duration::from_secs(5);
  loop {
    if let Some(status) = engine.status(job_id) {
      if matches!(
        status.state,
        JobState::Succeeded | JobState::Failed
      ) {
        return status;
      }
    }
    assert!(
      std::time::Instant::now() < deadline,
      "job {job_id} did not finish in time"
    );
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
  }
}
