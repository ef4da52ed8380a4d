use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use dashmap::DashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{Job, JobState, JobStatus, worker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
  #[error("job queue full")]
  QueueFull,
  #[error("job engine stopped")]
  Stopped,
}

/// Fixed pool of workers fed from a bounded queue. Submission never
/// blocks: over capacity it fails with [`SubmitError::QueueFull`].
/// The dispatcher hands each queued job to the first worker that
/// advertises a free inbox, bounding concurrency at the pool size.
pub struct JobEngine {
  queue: mpsc::Sender<Job>,
  statuses: Arc<DashMap<String, JobStatus>>,
  root: CancellationToken,
  stopped: AtomicBool,
  tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JobEngine {
  pub fn new(workers: usize, queue_size: usize) -> JobEngine {
    let workers = workers.max(1);
    let (queue_tx, queue_rx) =
      mpsc::channel::<Job>(queue_size.max(1));
    let (pool_tx, pool_rx) =
      mpsc::channel::<mpsc::Sender<Job>>(workers);
    let statuses = Arc::new(DashMap::new());
    let root = CancellationToken::new();
    let workers_cancel = CancellationToken::new();

    let mut tasks = Vec::with_capacity(workers + 1);
    for worker_id in 0..workers {
      tasks.push(tokio::spawn(worker::run(
        worker_id,
        pool_tx.clone(),
        statuses.clone(),
        workers_cancel.clone(),
      )));
    }
    tasks.push(tokio::spawn(dispatch(
      queue_rx,
      pool_rx,
      root.clone(),
      workers_cancel,
    )));

    JobEngine {
      queue: queue_tx,
      statuses,
      root,
      stopped: AtomicBool::new(false),
      tasks: Mutex::new(tasks),
    }
  }

  /// Queue a job for execution, returning its id. Fails immediately
  /// when the backlog is full or the engine is stopping.
  pub fn enqueue(&self, job: Job) -> Result<String, SubmitError> {
    if self.stopped.load(Ordering::SeqCst) {
      return Err(SubmitError::Stopped);
    }
    let id = job.id.clone();
    self.statuses.insert(
      id.clone(),
      JobStatus {
        job_id: id.clone(),
        namespace: job.namespace.clone(),
        kind: job.kind,
        state: JobState::Queued,
        start_time: None,
        end_time: None,
        execution_count: 0,
        failure_count: 0,
        last_error: None,
      },
    );
    match self.queue.try_send(job) {
      Ok(()) => {
        debug!("queued job {id}");
        Ok(id)
      }
      Err(mpsc::error::TrySendError::Full(_)) => {
        self.statuses.remove(&id);
        Err(SubmitError::QueueFull)
      }
      Err(mpsc::error::TrySendError::Closed(_)) => {
        self.statuses.remove(&id);
        Err(SubmitError::Stopped)
      }
    }
  }

  pub fn status(&self, id: &str) -> Option<JobStatus> {
    self.statuses.get(id).map(|status| status.clone())
  }

  /// Stop the engine: reject new submissions, give queued and
  /// in-flight jobs until `deadline` to finish, then abort whatever
  /// is left.
  pub async fn stop(&self, deadline: Duration) {
    if self.stopped.swap(true, Ordering::SeqCst) {
      return;
    }
    info!("job engine stopping");
    self.root.cancel();
    let mut tasks = {
      let mut guard =
        self.tasks.lock().expect("job engine task list poisoned");
      std::mem::take(&mut *guard)
    };
    let drained = tokio::time::timeout(
      deadline,
      futures::future::join_all(tasks.iter_mut()),
    )
    .await;
    if drained.is_err() {
      warn!(
        "job engine did not drain before deadline, aborting workers"
      );
      for task in &tasks {
        task.abort();
      }
    }
  }
}

/// Forward queued jobs to free workers. On shutdown, whatever was
/// already accepted into the queue is still dispatched before the
/// workers are signalled.
async fn dispatch(
  mut queue: mpsc::Receiver<Job>,
  mut pool: mpsc::Receiver<mpsc::Sender<Job>>,
  root: CancellationToken,
  workers: CancellationToken,
) {
  loop {
    let job = tokio::select! {
      job = queue.recv() => match job {
        Some(job) => job,
        None => break,
      },
      _ = root.cancelled() => break,
    };
    if !hand_off(job, &mut pool).await {
      break;
    }
  }

  while let Ok(job) = queue.try_recv() {
    if !hand_off(job, &mut pool).await {
      break;
    }
  }
  workers.cancel();
  debug!("job dispatcher stopped");
}

/// Hand one job to the next free worker, skipping inboxes of
/// workers that have already exited. All workers being busy blocks
/// here, which is what bounds concurrency.
async fn hand_off(
  mut job: Job,
  pool: &mut mpsc::Receiver<mpsc::Sender<Job>>,
) -> bool {
  loop {
    let Some(inbox) = pool.recv().await else {
      return false;
    };
    match inbox.send(job).await {
      Ok(()) => return true,
      Err(send_err) => job = send_err.0,
    }
  }
}
