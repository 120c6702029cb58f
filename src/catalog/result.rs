use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SequenceError;
use crate::task::TaskResult;

/// Outcome of one dispatched run of a [`super::Job`]. Named `JobResult`
/// rather than `Result` to stay out of the way of `std::result::Result` at
/// call sites that import it alongside fallible APIs.
#[derive(Debug)]
pub struct JobResult {
    pub uuid: Uuid,
    pub run_uuid: Uuid,
    pub trigger: DateTime<Utc>,
    pub run_time: Duration,
    pub task_results: Vec<TaskResult>,
    /// Set only when submitting the sequence to the repository itself
    /// failed, or the sequence was canceled before finishing; per-task
    /// errors live in `task_results` instead.
    pub error: Option<SequenceError>,
}
