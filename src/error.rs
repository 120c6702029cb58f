//! Error taxonomy for the orchestrator, grouped by subsystem and composed
//! into [`OrchestratorError`] where a caller needs to mix them.

use thiserror::Error;

use crate::schedule::Position;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid field count, got {0}, expected 5-7 elements separated by space")]
    InvalidFieldCount(usize),
    #[error("invalid expression in {0} field")]
    InvalidField(Position),
    #[error("non-ascending list of values in {0} field")]
    NonAscendingList(Position),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TickerError {
    #[error("ticker is already started")]
    AlreadyStarted,
    #[error("ticker is already stopped")]
    AlreadyStopped,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("handler timed out after {0:?}")]
    HandlerTimeout(std::time::Duration),
    #[error("handler canceled")]
    HandlerCanceled,
    #[error(transparent)]
    Domain(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("no handler pool found for task '{0}'")]
    NoHandlerForTask(String),
    #[error("handler pool is invalid (no default pool provided)")]
    InvalidPool,
    #[error("failed to submit task to handler pool '{0}': pool is shut down")]
    PoolShutDown(String),
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("sequence canceled")]
    Canceled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("job with uuid {0} already exists")]
    DuplicateJob(uuid::Uuid),
    #[error("job with uuid {0} does not exist")]
    JobNotFound(uuid::Uuid),
    #[error("no results recorded for job {0}")]
    ResultsNotFound(uuid::Uuid),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler did not observe a running listener within the start timeout")]
    SchedulerStartTimeout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("dispatcher did not fill all runner slots within the start timeout")]
    DispatcherStartTimeout,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Umbrella error for call sites that cross subsystem boundaries (e.g. the
/// orchestrator's dispatch helper, which touches the catalog, the queue and
/// the scheduler channel in the same function).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Ticker(#[from] TickerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
