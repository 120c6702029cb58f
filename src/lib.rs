//! `cronwright` is an in-process, cron-driven job orchestrator: a catalog of
//! jobs bound to cron schedules and task sequences, a scheduler that ticks
//! them when due, a bounded dispatcher that runs them, and a keyed registry
//! of bounded worker pools that execute their tasks.
//!
//! The pieces compose bottom-up:
//! - [`schedule`] parses and evaluates cron expressions.
//! - [`ticker`] drives a [`schedule::Schedule`] against wall-clock time.
//! - [`task`] defines the `Task`/`Handler`/`HandlerPool` contract and the
//!   sequence executor that runs a job's tasks through a repository.
//! - [`scheduler`] multiplexes one ticker per job into an aggregate stream.
//! - [`queue`] buffers scheduler ticks awaiting dispatch.
//! - [`dispatcher`] runs bounded job runners against queued ticks.
//! - [`catalog`] stores jobs and their run history.
//! - [`orchestrator`] wires everything above and owns its lifecycle.
//!
//! Embedders typically only touch [`catalog::Job`], [`task::Task`],
//! [`config::Config`] and [`orchestrator::Orchestrator`]; the rest is public
//! so the subsystems can be composed differently if needed.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod schedule;
pub mod scheduler;
pub mod task;
pub mod ticker;

pub use catalog::{Catalog, InMemoryCatalog, Job, JobResult};
pub use config::Config;
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use schedule::Schedule;
pub use task::Task;
