use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::metrics::Metrics;

use super::{Handler, HandlerResult, HandlerTask};

const PRIVATE_CHANNEL_CAPACITY: usize = 1;

fn default_max_workers(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Point-in-time counters for one [`HandlerPool`].
#[derive(Debug, Clone, Copy, Default, derive_getters::Getters)]
pub struct HandlerPoolStatistics {
    active_workers: usize,
    idle_workers: usize,
    workers: usize,
    max_workers: usize,
    tasks_ingested: u64,
    tasks_processed: u64,
    tasks_waiting: usize,
    workers_recycled: u64,
}

#[derive(Default)]
struct Counters {
    workers: AtomicUsize,
    active_workers: AtomicUsize,
    tasks_ingested: AtomicU64,
    tasks_processed: AtomicU64,
    tasks_waiting: AtomicUsize,
    workers_recycled: AtomicU64,
}

/// A bounded worker pool dedicated to one [`Handler`]. Holds a public input
/// channel (buffered to `max_workers`) that callers send [`HandlerTask`]s
/// into; a listener forwards them onto a small private channel that the
/// worker pool actually pulls from.
pub struct HandlerPool {
    name: String,
    max_workers: usize,
    input_tx: mpsc::Sender<HandlerTask>,
    counters: Arc<Counters>,
}

impl HandlerPool {
    /// Builds and starts a pool of `max_workers` (or the available-parallelism
    /// count, if zero) workers running `handler`, cancelable via `cancel`.
    /// `recycle_after`, if set, makes each worker exit (and get replaced)
    /// after that many completed tasks.
    pub fn new(
        cancel: CancellationToken,
        handler: Handler,
        max_workers: usize,
        recycle_after: Option<u64>,
        metrics: Arc<Metrics>,
    ) -> HandlerPool {
        let max_workers = default_max_workers(max_workers);
        let name = handler.name().to_owned();
        let (input_tx, input_rx) = mpsc::channel(max_workers);
        let (worker_tx, worker_rx) = mpsc::channel(PRIVATE_CHANNEL_CAPACITY);
        let worker_rx = Arc::new(AsyncMutex::new(worker_rx));
        let counters = Arc::new(Counters::default());

        metrics.set_workers_max(&name, max_workers);

        tokio::spawn(listen(
            name.clone(),
            cancel.clone(),
            input_rx,
            worker_tx.clone(),
            counters.clone(),
            metrics.clone(),
        ));
        tokio::spawn(supervise(
            name.clone(),
            cancel,
            handler,
            max_workers,
            recycle_after,
            worker_rx,
            worker_tx,
            counters.clone(),
            metrics,
        ));

        HandlerPool {
            name,
            max_workers,
            input_tx,
            counters,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Enqueues `task` on the public input channel. Blocks (without error)
    /// once the channel is full, applying backpressure to the submitter.
    pub async fn submit(&self, task: HandlerTask) -> Result<(), mpsc::error::SendError<HandlerTask>> {
        self.input_tx.send(task).await
    }

    pub fn statistics(&self) -> HandlerPoolStatistics {
        let workers = self.counters.workers.load(Ordering::Relaxed);
        let active_workers = self.counters.active_workers.load(Ordering::Relaxed);
        HandlerPoolStatistics {
            active_workers,
            idle_workers: workers.saturating_sub(active_workers),
            workers,
            max_workers: self.max_workers,
            tasks_ingested: self.counters.tasks_ingested.load(Ordering::Relaxed),
            tasks_processed: self.counters.tasks_processed.load(Ordering::Relaxed),
            tasks_waiting: self.counters.tasks_waiting.load(Ordering::Relaxed),
            workers_recycled: self.counters.workers_recycled.load(Ordering::Relaxed),
        }
    }
}

async fn listen(
    name: String,
    cancel: CancellationToken,
    mut input_rx: mpsc::Receiver<HandlerTask>,
    worker_tx: mpsc::Sender<HandlerTask>,
    counters: Arc<Counters>,
    metrics: Arc<Metrics>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = input_rx.recv() => {
                match received {
                    Some(task) => forward(&name, task, &worker_tx, &counters, &metrics).await,
                    None => break,
                }
            }
        }
    }

    debug!("handler pool '{name}' draining public input before shutdown");
    while let Ok(task) = input_rx.try_recv() {
        forward(&name, task, &worker_tx, &counters, &metrics).await;
    }
    // Dropping our sender closes the private channel once this task ends,
    // which is how idle workers learn to exit.
}

async fn forward(
    name: &str,
    task: HandlerTask,
    worker_tx: &mpsc::Sender<HandlerTask>,
    counters: &Counters,
    metrics: &Metrics,
) {
    counters.tasks_ingested.fetch_add(1, Ordering::Relaxed);
    counters.tasks_waiting.fetch_add(1, Ordering::Relaxed);
    metrics.incr_tasks_ingested(name);
    metrics.set_tasks_waiting(name, counters.tasks_waiting.load(Ordering::Relaxed));
    if worker_tx.send(task).await.is_err() {
        warn!("handler pool '{name}' worker channel closed while forwarding a task");
    }
    counters.tasks_waiting.fetch_sub(1, Ordering::Relaxed);
    metrics.set_tasks_waiting(name, counters.tasks_waiting.load(Ordering::Relaxed));
}

#[allow(clippy::too_many_arguments)]
async fn supervise(
    name: String,
    cancel: CancellationToken,
    handler: Handler,
    max_workers: usize,
    recycle_after: Option<u64>,
    worker_rx: Arc<AsyncMutex<mpsc::Receiver<HandlerTask>>>,
    worker_tx: mpsc::Sender<HandlerTask>,
    counters: Arc<Counters>,
    metrics: Arc<Metrics>,
) {
    let (exit_tx, mut exit_rx) = mpsc::channel::<()>(max_workers.max(1));

    for _ in 0..max_workers {
        spawn_worker(
            name.clone(),
            cancel.clone(),
            handler.clone(),
            recycle_after,
            worker_rx.clone(),
            counters.clone(),
            metrics.clone(),
            exit_tx.clone(),
        );
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            exited = exit_rx.recv() => {
                if exited.is_none() {
                    break;
                }
                if counters.workers.load(Ordering::Relaxed) < max_workers {
                    spawn_worker(
                        name.clone(),
                        cancel.clone(),
                        handler.clone(),
                        recycle_after,
                        worker_rx.clone(),
                        counters.clone(),
                        metrics.clone(),
                        exit_tx.clone(),
                    );
                }
            }
        }
    }
    // Stop replenishing; workers already spawned keep draining until the
    // worker channel (owned by `listen`) closes on its own.
    drop(worker_tx);
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker(
    name: String,
    cancel: CancellationToken,
    handler: Handler,
    recycle_after: Option<u64>,
    worker_rx: Arc<AsyncMutex<mpsc::Receiver<HandlerTask>>>,
    counters: Arc<Counters>,
    metrics: Arc<Metrics>,
    exit_tx: mpsc::Sender<()>,
) {
    counters.workers.fetch_add(1, Ordering::Relaxed);
    metrics.set_workers_total(&name, counters.workers.load(Ordering::Relaxed));
    debug!("handler pool '{name}' spawned worker");

    tokio::spawn(async move {
        run_worker(&name, &cancel, &handler, recycle_after, &worker_rx, &counters, &metrics).await;
        counters.workers.fetch_sub(1, Ordering::Relaxed);
        metrics.set_workers_total(&name, counters.workers.load(Ordering::Relaxed));
        let _ = exit_tx.send(()).await;
    });
}

async fn run_worker(
    name: &str,
    cancel: &CancellationToken,
    handler: &Handler,
    recycle_after: Option<u64>,
    worker_rx: &Arc<AsyncMutex<mpsc::Receiver<HandlerTask>>>,
    counters: &Counters,
    metrics: &Metrics,
) {
    let mut completed = 0u64;
    loop {
        let task = {
            let mut rx = worker_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else { break };

        counters.active_workers.fetch_add(1, Ordering::Relaxed);
        metrics.set_workers_active(name, counters.active_workers.load(Ordering::Relaxed));
        metrics.set_workers_idle(
            name,
            counters
                .workers
                .load(Ordering::Relaxed)
                .saturating_sub(counters.active_workers.load(Ordering::Relaxed)),
        );

        let (status, error) = handler
            .execute(cancel.clone(), task.task.clone(), task.pipeline.clone())
            .await;

        if let Some(result_tx) = task.result_tx {
            let _ = result_tx
                .send(HandlerResult {
                    task_name: task.task.name(),
                    status,
                    error,
                })
                .await;
        }

        counters.tasks_processed.fetch_add(1, Ordering::Relaxed);
        counters.active_workers.fetch_sub(1, Ordering::Relaxed);
        metrics.incr_tasks_processed(name, status);
        metrics.set_workers_active(name, counters.active_workers.load(Ordering::Relaxed));

        completed += 1;
        if let Some(n) = recycle_after {
            if completed >= n {
                counters.workers_recycled.fetch_add(1, Ordering::Relaxed);
                metrics.incr_workers_recycled(name);
                debug!("handler pool '{name}' recycling worker after {completed} tasks");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Pipeline;
    use crate::task::library::EmptyTask;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn submitted_task_is_processed_and_reported() {
        let handler = Handler::new(
            "EmptyTask",
            Duration::from_secs(1),
            |_cancel, _task, _pipeline| async { Ok(()) },
        );
        let pool = HandlerPool::new(
            CancellationToken::new(),
            handler,
            2,
            None,
            Arc::new(Metrics::new()),
        );

        let (tx, mut rx) = mpsc::channel(1);
        pool.submit(HandlerTask::with_result_channel(
            StdArc::new(EmptyTask),
            StdArc::new(Pipeline::new()),
            tx,
        ))
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.status, crate::task::Status::Success);
        assert_eq!(pool.statistics().tasks_processed(), &1);
    }

    #[tokio::test]
    async fn zero_max_workers_falls_back_to_available_parallelism() {
        let handler = Handler::new("EmptyTask", Duration::from_secs(1), |_, _, _| async { Ok(()) });
        let pool = HandlerPool::new(CancellationToken::new(), handler, 0, None, Arc::new(Metrics::new()));
        assert!(pool.max_workers() >= 1);
    }
}
