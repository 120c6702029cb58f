use std::sync::Arc;

use uuid::Uuid;

use crate::schedule::Schedule;
use crate::task::Task;

/// A scheduled unit of work: a cron schedule, concurrency/run-count limits,
/// and the ordered sequence of tasks that run on each trigger.
///
/// Builder-style `with_*` methods return an updated owned copy, mirroring
/// the functional-option style of the system this crate reimagines.
#[derive(Clone)]
pub struct Job {
    uuid: Uuid,
    name: String,
    schedule: Schedule,
    enabled: bool,
    limit_concurrency: bool,
    max_concurrency: usize,
    limit_runs: bool,
    max_runs: u64,
    tasks: Vec<Arc<dyn Task>>,
}

impl Job {
    pub fn new(uuid: Uuid, name: impl Into<String>, schedule: Schedule, tasks: Vec<Arc<dyn Task>>) -> Job {
        Job {
            uuid,
            name: name.into(),
            schedule,
            enabled: false,
            limit_concurrency: true,
            max_concurrency: 1,
            limit_runs: false,
            max_runs: 0,
            tasks,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit_concurrency(&self) -> bool {
        self.limit_concurrency
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn limit_runs(&self) -> bool {
        self.limit_runs
    }

    pub fn max_runs(&self) -> u64 {
        self.max_runs
    }

    pub fn tasks(&self) -> &[Arc<dyn Task>] {
        &self.tasks
    }

    pub fn enable(mut self) -> Job {
        self.enabled = true;
        self
    }

    pub fn disable(mut self) -> Job {
        self.enabled = false;
        self
    }

    pub fn with_max_concurrency(mut self, n: usize) -> Job {
        self.limit_concurrency = true;
        self.max_concurrency = n;
        self
    }

    pub fn with_no_concurrency(mut self) -> Job {
        self.limit_concurrency = true;
        self.max_concurrency = 1;
        self
    }

    pub fn with_unlimited_concurrency(mut self) -> Job {
        self.limit_concurrency = false;
        self
    }

    pub fn with_max_runs(mut self, n: u64) -> Job {
        self.limit_runs = true;
        self.max_runs = n;
        self
    }

    pub fn with_unlimited_runs(mut self) -> Job {
        self.limit_runs = false;
        self
    }
}
