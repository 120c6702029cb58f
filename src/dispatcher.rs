//! Bounded pool of job runners that turn scheduler ticks into [`JobResult`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::{Job, JobResult};
use crate::error::DispatcherError;
use crate::task::{execute_sequence, HandlerRepository};

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One unit of dispatchable work: a job to run, the repository its tasks
/// execute against, and the instant that triggered it.
pub struct DispatcherMessage {
    pub job: Job,
    pub repository: Arc<HandlerRepository>,
    pub trigger: DateTime<Utc>,
}

fn clamp_max_runners(requested: usize) -> usize {
    requested.max(1)
}

/// Fixed-size pool of runners pulling [`DispatcherMessage`]s off one shared
/// channel. A supervising task keeps exactly `max_runners` runners alive;
/// each runner removes its own slot on exit so a panicking handler future
/// doesn't permanently shrink the pool. Slots are tracked in a map keyed by
/// a monotonically increasing runner id, purely for introspection: every
/// runner shares the same cancellation token.
pub struct Dispatcher {
    max_runners: usize,
    start_timeout: Duration,
    input_tx: mpsc::Sender<DispatcherMessage>,
    input_rx: AsyncMutex<Option<mpsc::Receiver<DispatcherMessage>>>,
    result_tx: mpsc::Sender<JobResult>,
    result_rx: AsyncMutex<Option<mpsc::Receiver<JobResult>>>,
    running_runners: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(max_runners: usize, start_timeout: Duration) -> Dispatcher {
        let max_runners = clamp_max_runners(max_runners);
        let (input_tx, input_rx) = mpsc::channel(max_runners);
        let (result_tx, result_rx) = mpsc::channel(max_runners);

        Dispatcher {
            max_runners,
            start_timeout,
            input_tx,
            input_rx: AsyncMutex::new(Some(input_rx)),
            result_tx,
            result_rx: AsyncMutex::new(Some(result_rx)),
            running_runners: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_runners(&self) -> usize {
        self.max_runners
    }

    pub fn is_running(&self) -> bool {
        self.running_runners.load(Ordering::Relaxed) >= self.max_runners
    }

    pub fn sender(&self) -> mpsc::Sender<DispatcherMessage> {
        self.input_tx.clone()
    }

    /// Takes ownership of the result stream. Call once, before `start`.
    pub async fn take_results(&self) -> mpsc::Receiver<JobResult> {
        self.result_rx
            .lock()
            .await
            .take()
            .expect("dispatcher results already taken")
    }

    /// Starts the supervisor under a child of `parent`, waiting until every
    /// runner slot is filled (or `DispatcherStartTimeout` after `start_timeout`).
    pub async fn start(&self, parent: &CancellationToken) -> Result<(), DispatcherError> {
        let mut guard = self.input_rx.lock().await;
        let input_rx = guard.take().expect("dispatcher already started");
        drop(guard);

        let token = parent.child_token();
        let input_rx = Arc::new(AsyncMutex::new(input_rx));

        tokio::spawn(supervise(
            token,
            self.max_runners,
            input_rx,
            self.result_tx.clone(),
            self.running_runners.clone(),
        ));

        let deadline = tokio::time::Instant::now() + self.start_timeout;
        while !self.is_running() {
            if tokio::time::Instant::now() >= deadline {
                return Err(DispatcherError::DispatcherStartTimeout);
            }
            tokio::time::sleep(READINESS_POLL_INTERVAL).await;
        }
        debug!("dispatcher started with {} runners", self.max_runners);
        Ok(())
    }
}

async fn supervise(
    cancel: CancellationToken,
    max_runners: usize,
    input_rx: Arc<AsyncMutex<mpsc::Receiver<DispatcherMessage>>>,
    result_tx: mpsc::Sender<JobResult>,
    running_runners: Arc<AtomicUsize>,
) {
    let mut next_id: u64 = 0;
    let mut slots: HashMap<u64, CancellationToken> = HashMap::new();
    let (exit_tx, mut exit_rx) = mpsc::channel::<u64>(max_runners.max(1));

    for _ in 0..max_runners {
        let id = next_id;
        next_id += 1;
        slots.insert(id, cancel.clone());
        spawn_runner(id, cancel.clone(), input_rx.clone(), result_tx.clone(), exit_tx.clone());
        running_runners.store(slots.len(), Ordering::Relaxed);
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            exited = exit_rx.recv() => {
                let Some(id) = exited else { break };
                slots.remove(&id);
                running_runners.store(slots.len(), Ordering::Relaxed);

                let id = next_id;
                next_id += 1;
                slots.insert(id, cancel.clone());
                spawn_runner(id, cancel.clone(), input_rx.clone(), result_tx.clone(), exit_tx.clone());
                running_runners.store(slots.len(), Ordering::Relaxed);
            }
        }
    }

    debug!("dispatcher stopping, {} runner slots winding down", slots.len());
}

fn spawn_runner(
    id: u64,
    cancel: CancellationToken,
    input_rx: Arc<AsyncMutex<mpsc::Receiver<DispatcherMessage>>>,
    result_tx: mpsc::Sender<JobResult>,
    exit_tx: mpsc::Sender<u64>,
) {
    tokio::spawn(async move {
        run_runner(id, &cancel, &input_rx, &result_tx).await;
        let _ = exit_tx.send(id).await;
    });
}

async fn run_runner(
    id: u64,
    cancel: &CancellationToken,
    input_rx: &Arc<AsyncMutex<mpsc::Receiver<DispatcherMessage>>>,
    result_tx: &mpsc::Sender<JobResult>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = async {
                let mut rx = input_rx.lock().await;
                rx.recv().await
            } => received,
        };
        let Some(message) = message else { break };

        let started = tokio::time::Instant::now();
        let (task_results, error) = execute_sequence(cancel.clone(), message.job.tasks().to_vec(), &message.repository).await;
        let run_time = started.elapsed();

        let result = JobResult {
            uuid: message.job.uuid(),
            run_uuid: Uuid::new_v4(),
            trigger: message.trigger,
            run_time,
            task_results,
            error,
        };

        if result_tx.send(result).await.is_err() {
            debug!("runner {id} dropping result, output channel closed");
            break;
        }
    }
}
