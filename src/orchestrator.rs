//! Wires schedule, scheduler, queue, dispatcher, catalog and handler
//! repository into one runnable unit, and owns the reconciliation loops that
//! keep them converged on the catalog's state.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::{Catalog, InMemoryCatalog, Job, JobResult};
use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherMessage};
use crate::error::{OrchestratorError, TickerError};
use crate::metrics::Metrics;
use crate::queue::{InMemoryQueue, Queue};
use crate::scheduler::{Scheduler, SchedulerMessage, SchedulerTick};
use crate::task::{HandlerRepository, Status};

const JOIN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Top-level composition of the orchestrator's subsystems. Construct once
/// with [`Orchestrator::new`], call [`Orchestrator::start`], and
/// [`Orchestrator::stop`] to tear everything down.
pub struct Orchestrator {
    name: String,
    config: Config,
    catalog: Arc<dyn Catalog>,
    queue: Arc<dyn Queue>,
    repository: Arc<HandlerRepository>,
    metrics: Arc<Metrics>,
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    tick_rx: AsyncMutex<Option<mpsc::Receiver<SchedulerTick>>>,
    queue_notify: Arc<Notify>,
    token: AsyncMutex<Option<CancellationToken>>,
    handles: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Builds every subsystem, sized by `config.max_runners`, against a
    /// catalog the caller owns — use this when the catalog is a
    /// non-default [`Catalog`] implementation (or an [`InMemoryCatalog`]
    /// already constructed with its own retention). Nothing runs until
    /// [`Orchestrator::start`] is called.
    pub fn new(name: impl Into<String>, config: Config, catalog: Arc<dyn Catalog>) -> Orchestrator {
        let name = name.into();
        let metrics = Arc::new(Metrics::new());
        let repository = Arc::new(HandlerRepository::with_default_pool_workers(
            name.clone(),
            metrics.clone(),
            config.default_handler_pool_workers,
        ));
        let (tick_tx, tick_rx) = mpsc::channel(config.max_runners);
        let scheduler = Scheduler::new(tick_tx, config.max_runners, config.scheduler_start_timeout());
        let dispatcher = Dispatcher::new(config.max_runners, config.dispatcher_start_timeout());

        Orchestrator {
            name,
            config,
            catalog,
            queue: Arc::new(InMemoryQueue::new()),
            repository,
            metrics,
            scheduler,
            dispatcher,
            tick_rx: AsyncMutex::new(Some(tick_rx)),
            queue_notify: Arc::new(Notify::new()),
            token: AsyncMutex::new(None),
            handles: AsyncMutex::new(Vec::new()),
        }
    }

    /// As [`Orchestrator::new`], but owns its catalog: an [`InMemoryCatalog`]
    /// built with `config.result_retention`. The common case for embedders
    /// who don't need a custom [`Catalog`] backend.
    pub fn with_in_memory_catalog(name: impl Into<String>, config: Config) -> Orchestrator {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::with_retention(config.result_retention));
        Orchestrator::new(name, config, catalog)
    }

    pub fn repository(&self) -> Arc<HandlerRepository> {
        self.repository.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn catalog(&self) -> Arc<dyn Catalog> {
        self.catalog.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Starts the dispatcher, then the scheduler, then the five
    /// reconciliation/fan-in loops, under one root cancellation token.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut token_guard = self.token.lock().await;
        if token_guard.is_some() {
            return Err(OrchestratorError::Ticker(TickerError::AlreadyStarted));
        }
        let token = CancellationToken::new();

        self.dispatcher.start(&token).await?;
        let results_rx = self.dispatcher.take_results().await;
        self.scheduler.start(&token).await?;

        let tick_rx = self
            .tick_rx
            .lock()
            .await
            .take()
            .expect("orchestrator already started");

        let mut handles = self.handles.lock().await;
        handles.push(tokio::spawn(drain_results(
            token.clone(),
            results_rx,
            self.catalog.clone(),
            self.metrics.clone(),
            self.name.clone(),
        )));
        handles.push(tokio::spawn(listen_ticks(
            token.clone(),
            tick_rx,
            self.queue.clone(),
            self.queue_notify.clone(),
            self.metrics.clone(),
            self.name.clone(),
        )));
        handles.push(tokio::spawn(process_queue(
            token.clone(),
            self.queue.clone(),
            self.queue_notify.clone(),
            self.catalog.clone(),
            self.repository.clone(),
            self.dispatcher.sender(),
            self.config.catalog_retry_attempts,
            self.config.catalog_retry_backoff(),
            self.metrics.clone(),
            self.name.clone(),
        )));
        handles.push(tokio::spawn(reconcile_schedulable(
            token.clone(),
            self.catalog.clone(),
            self.scheduler.sender(),
            self.config.reconciliation_interval(),
        )));
        handles.push(tokio::spawn(reconcile_not_schedulable(
            token.clone(),
            self.catalog.clone(),
            self.scheduler.sender(),
            self.config.reconciliation_interval(),
        )));
        drop(handles);

        info!("orchestrator '{}' started with {} runners", self.name, self.config.max_runners);
        *token_guard = Some(token);
        Ok(())
    }

    /// Cancels the root token, which cascades to every descendant scope, then
    /// joins the five background tasks within a bounded grace period.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        let mut token_guard = self.token.lock().await;
        let Some(token) = token_guard.take() else {
            return Err(OrchestratorError::Ticker(TickerError::AlreadyStopped));
        };
        token.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock().await);
        let joined = tokio::time::timeout(JOIN_GRACE_PERIOD, futures_join_all(handles)).await;
        if joined.is_err() {
            warn!("orchestrator '{}' stop: background tasks did not join within the grace period", self.name);
        }
        info!("orchestrator '{}' stopped", self.name);
        Ok(())
    }
}

/// Minimal stand-in for `futures::future::join_all` so this module doesn't
/// need to pull in the `futures` crate for one call site.
async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

async fn drain_results(
    token: CancellationToken,
    mut results_rx: mpsc::Receiver<JobResult>,
    catalog: Arc<dyn Catalog>,
    metrics: Arc<Metrics>,
    name: String,
) {
    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = results_rx.recv() => received,
        };
        let Some(result) = result else { break };

        let status = aggregate_status(&result);
        metrics.incr_jobs_processed_total(&name, status);

        let catalog = catalog.clone();
        tokio::spawn(async move {
            if let Err(err) = catalog.append_result(result) {
                warn!("orchestrator: failed to append result to catalog: {err}");
            }
        });
    }
    debug!("orchestrator '{name}' result drain stopped");
}

fn aggregate_status(result: &JobResult) -> Status {
    if let Some(err) = &result.error {
        return match err {
            crate::error::SequenceError::Canceled => Status::Canceled,
            crate::error::SequenceError::Repository(_) => Status::Error,
        };
    }
    if result.task_results.iter().any(|t| t.status == Status::Error) {
        return Status::Error;
    }
    if result.task_results.iter().any(|t| t.status == Status::Canceled) {
        return Status::Canceled;
    }
    Status::Success
}

async fn listen_ticks(
    token: CancellationToken,
    mut tick_rx: mpsc::Receiver<SchedulerTick>,
    queue: Arc<dyn Queue>,
    queue_notify: Arc<Notify>,
    metrics: Arc<Metrics>,
    name: String,
) {
    loop {
        let tick = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = tick_rx.recv() => received,
        };
        let Some(tick) = tick else { break };

        queue.push(tick);
        metrics.set_queue_length(&name, queue.len());
        queue_notify.notify_one();
    }
    debug!("orchestrator '{name}' tick listener stopped");
}

#[allow(clippy::too_many_arguments)]
async fn process_queue(
    token: CancellationToken,
    queue: Arc<dyn Queue>,
    queue_notify: Arc<Notify>,
    catalog: Arc<dyn Catalog>,
    repository: Arc<HandlerRepository>,
    dispatch_tx: mpsc::Sender<DispatcherMessage>,
    retry_attempts: usize,
    retry_backoff: Duration,
    metrics: Arc<Metrics>,
    name: String,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = queue_notify.notified() => {}
        }

        while let Ok(tick) = queue.pop() {
            metrics.set_queue_length(&name, queue.len());
            dispatch_one(
                &token,
                tick,
                &catalog,
                &repository,
                &dispatch_tx,
                retry_attempts,
                retry_backoff,
            )
            .await;
        }
    }
    debug!("orchestrator '{name}' queue processor stopped");
}

async fn dispatch_one(
    token: &CancellationToken,
    tick: SchedulerTick,
    catalog: &Arc<dyn Catalog>,
    repository: &Arc<HandlerRepository>,
    dispatch_tx: &mpsc::Sender<DispatcherMessage>,
    retry_attempts: usize,
    retry_backoff: Duration,
) {
    let job = match fetch_job_with_retry(token, catalog, tick.uuid, retry_attempts, retry_backoff).await {
        Some(job) => job,
        None => {
            warn!("orchestrator: dropping tick for unknown job {}", tick.uuid);
            return;
        }
    };

    let message = DispatcherMessage {
        job,
        repository: repository.clone(),
        trigger: tick.time,
    };
    if dispatch_tx.send(message).await.is_err() {
        warn!("orchestrator: dispatcher input channel closed, dropping tick for {}", tick.uuid);
    }
}

async fn fetch_job_with_retry(
    token: &CancellationToken,
    catalog: &Arc<dyn Catalog>,
    uuid: Uuid,
    attempts: usize,
    backoff: Duration,
) -> Option<Job> {
    for attempt in 0..attempts.max(1) {
        match catalog.get(uuid) {
            Ok(job) => return Some(job),
            Err(_) if attempt + 1 < attempts.max(1) => {
                tokio::select! {
                    _ = token.cancelled() => return None,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
            Err(_) => return None,
        }
    }
    None
}

async fn reconcile_schedulable(
    token: CancellationToken,
    catalog: Arc<dyn Catalog>,
    scheduler_tx: mpsc::Sender<SchedulerMessage>,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        for job in catalog.get_schedulable() {
            let message = SchedulerMessage {
                uuid: job.uuid(),
                enabled: true,
                schedule: job.schedule().clone(),
            };
            if scheduler_tx.send(message).await.is_err() {
                return;
            }
        }
    }
}

async fn reconcile_not_schedulable(
    token: CancellationToken,
    catalog: Arc<dyn Catalog>,
    scheduler_tx: mpsc::Sender<SchedulerMessage>,
    interval: Duration,
) {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        for job in catalog.get_not_schedulable() {
            let message = SchedulerMessage {
                uuid: job.uuid(),
                enabled: false,
                schedule: job.schedule().clone(),
            };
            if scheduler_tx.send(message).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;
    use crate::task::library::EmptyTask;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn run_limited_job_stops_after_max_runs() {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let uuid = Uuid::new_v4();
        let job = Job::new(uuid, "demo", Schedule::every_second(), vec![StdArc::new(EmptyTask)])
            .enable()
            .with_max_runs(2);
        catalog.add(job).unwrap();

        let config = Config::default().with_max_runners(1);
        let orchestrator = Orchestrator::new("test", config, catalog.clone());
        orchestrator.start().await.unwrap();

        for _ in 0..80 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if catalog.result_count(uuid) >= 3 {
                break;
            }
        }

        orchestrator.stop().await.unwrap();
        assert!(catalog.result_count(uuid) >= 3);
    }

    #[tokio::test]
    async fn starting_twice_errors() {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let orchestrator = Orchestrator::new("test", Config::default(), catalog);
        orchestrator.start().await.unwrap();
        assert!(orchestrator.start().await.is_err());
        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stopping_unstarted_errors() {
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let orchestrator = Orchestrator::new("test", Config::default(), catalog);
        assert!(orchestrator.stop().await.is_err());
    }

    #[tokio::test]
    async fn with_in_memory_catalog_honors_configured_result_retention() {
        let config = Config::default().with_max_runners(1);
        let config = Config { result_retention: 2, ..config };
        let orchestrator = Orchestrator::with_in_memory_catalog("test", config);

        let catalog = orchestrator.catalog();
        let uuid = Uuid::new_v4();
        let job = Job::new(uuid, "demo", Schedule::every_second(), vec![StdArc::new(EmptyTask)]);
        catalog.add(job).unwrap();

        for _ in 0..5 {
            catalog
                .append_result(JobResult {
                    uuid,
                    run_uuid: Uuid::new_v4(),
                    trigger: chrono::Utc::now(),
                    run_time: Duration::from_millis(1),
                    task_results: vec![],
                    error: None,
                })
                .unwrap();
        }

        assert_eq!(catalog.result_count(uuid), 2);
    }

    #[tokio::test]
    async fn dispatcher_and_scheduler_inherit_configured_start_timeouts() {
        let config = Config::default()
            .with_max_runners(1);
        let config = Config {
            scheduler_start_timeout_ms: 50,
            dispatcher_start_timeout_ms: 50,
            ..config
        };
        let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
        let orchestrator = Orchestrator::new("test", config, catalog);
        orchestrator.start().await.unwrap();
        orchestrator.stop().await.unwrap();
    }
}
