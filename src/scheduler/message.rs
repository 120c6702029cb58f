use uuid::Uuid;

use crate::schedule::Schedule;

/// Reconciliation instruction sent into the [`super::Scheduler`]: the
/// desired enabled/disabled state and schedule for one job.
#[derive(Debug, Clone)]
pub struct SchedulerMessage {
    pub uuid: Uuid,
    pub enabled: bool,
    pub schedule: Schedule,
}

/// One schedule match for a job, tagged with the uuid that fired it and
/// re-emitted by a [`super::SchedulerTicker`] onto the scheduler's aggregate
/// stream.
#[derive(Debug, Clone)]
pub struct SchedulerTick {
    pub uuid: Uuid,
    pub time: chrono::DateTime<chrono::Utc>,
}
