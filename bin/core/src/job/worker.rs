use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Job, JobState, JobStatus};
use crate::helpers;

/// One worker: repeatedly advertise the inbox on the pool channel,
/// wait for a job, run it to a terminal state, go again.
pub(super) async fn run(
  id: usize,
  pool: mpsc::Sender<mpsc::Sender<Job>>,
  statuses: Arc<DashMap<String, JobStatus>>,
  cancel: CancellationToken,
) {
  debug!("worker {id} started");
  let (inbox_tx, mut inbox) = mpsc::channel::<Job>(1);
  loop {
    if pool.send(inbox_tx.clone()).await.is_err() {
      break;
    }
    let job = tokio::select! {
      job = inbox.recv() => match job {
        Some(job) => job,
        None => break,
      },
      _ = cancel.cancelled() => break,
    };
    execute(job, &statuses).await;
  }
  debug!("worker {id} stopped");
}

async fn execute(job: Job, statuses: &DashMap<String, JobStatus>) {
  let Job {
    id,
    namespace,
    retry_policy,
    args,
    run,
    ..
  } = job;

  update(statuses, &id, |status| {
    status.state = JobState::Running;
    status.start_time = Some(helpers::utc_date_string());
  });

  let mut succeeded = false;
  for _ in 0..retry_policy.max(1) {
    // Spawn each attempt so a panicking run is contained to its
    // own task instead of tearing the worker down.
    let result = match tokio::spawn(run(args.clone())).await {
      Ok(result) => result,
      Err(join_err) => {
        Err(anyhow::anyhow!("job run panicked | {join_err}"))
      }
    };
    match result {
      Ok(()) => {
        update(statuses, &id, |status| {
          status.execution_count += 1;
        });
        debug!("completed job {id} for {namespace}");
        succeeded = true;
        break;
      }
      Err(e) => {
        error!("error processing job {id} | {e:#}");
        update(statuses, &id, |status| {
          status.execution_count += 1;
          status.failure_count += 1;
          status.last_error = Some(format!("{e:#}"));
        });
      }
    }
  }

  update(statuses, &id, |status| {
    status.end_time = Some(helpers::utc_date_string());
    status.state = if succeeded {
      JobState::Succeeded
    } else {
      JobState::Failed
    };
  });
}

fn update(
  statuses: &DashMap<String, JobStatus>,
  id: &str,
  mutate: impl FnOnce(&mut JobStatus),
) {
  if let Some(mut status) = statuses.get_mut(id) {
    mutate(&mut status);
  }
}
