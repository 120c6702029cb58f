//! In-memory store of jobs and their run history.

mod job;
mod result;

pub use job::Job;
pub use result::JobResult;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::error::CatalogError;

const DEFAULT_RESULT_RETENTION: usize = 1000;

/// Point-in-time counts over the catalog's jobs.
#[derive(Debug, Clone, Copy, Default, derive_getters::Getters)]
pub struct CatalogStatistics {
    count: usize,
    enabled_count: usize,
    disabled_count: usize,
}

/// Storage contract for jobs and their results, so the in-memory variant can
/// be swapped for a persistent one without touching the orchestrator.
pub trait Catalog: Send + Sync {
    fn add(&self, job: Job) -> Result<(), CatalogError>;
    fn update(&self, job: Job) -> Result<(), CatalogError>;
    fn delete(&self, uuid: Uuid) -> Result<(), CatalogError>;
    fn get(&self, uuid: Uuid) -> Result<Job, CatalogError>;
    fn all(&self) -> Vec<Job>;
    fn statistics(&self) -> CatalogStatistics;

    /// Jobs with no run history yet, or not run-limited, or run-limited but
    /// still under their cap.
    fn get_schedulable(&self) -> Vec<Job>;
    /// Jobs that are run-limited and have reached their cap.
    fn get_not_schedulable(&self) -> Vec<Job>;

    fn append_result(&self, result: JobResult) -> Result<(), CatalogError>;
    fn results(&self, uuid: Uuid) -> Result<Vec<Arc<JobResult>>, CatalogError>;
    fn result_count(&self, uuid: Uuid) -> usize;
}

struct Inner {
    jobs: HashMap<Uuid, Job>,
    results: HashMap<Uuid, Vec<Arc<JobResult>>>,
}

/// The reference, process-local [`Catalog`] implementation. Jobs and results
/// live behind one `RwLock`; every read returns an owned snapshot so callers
/// never hold a reference into the live map across an await point.
pub struct InMemoryCatalog {
    inner: RwLock<Inner>,
    result_retention: usize,
}

impl InMemoryCatalog {
    pub fn new() -> InMemoryCatalog {
        InMemoryCatalog::with_retention(DEFAULT_RESULT_RETENTION)
    }

    pub fn with_retention(result_retention: usize) -> InMemoryCatalog {
        InMemoryCatalog {
            inner: RwLock::new(Inner {
                jobs: HashMap::new(),
                results: HashMap::new(),
            }),
            result_retention,
        }
    }

    fn is_schedulable(job: &Job, result_count: usize) -> bool {
        !job.limit_runs() || (result_count as u64) <= job.max_runs()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> InMemoryCatalog {
        InMemoryCatalog::new()
    }
}

impl Catalog for InMemoryCatalog {
    fn add(&self, job: Job) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        if inner.jobs.contains_key(&job.uuid()) {
            return Err(CatalogError::DuplicateJob(job.uuid()));
        }
        inner.jobs.insert(job.uuid(), job);
        Ok(())
    }

    fn update(&self, job: Job) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        if !inner.jobs.contains_key(&job.uuid()) {
            return Err(CatalogError::JobNotFound(job.uuid()));
        }
        inner.jobs.insert(job.uuid(), job);
        Ok(())
    }

    fn delete(&self, uuid: Uuid) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        if inner.jobs.remove(&uuid).is_none() {
            return Err(CatalogError::JobNotFound(uuid));
        }
        inner.results.remove(&uuid);
        Ok(())
    }

    fn get(&self, uuid: Uuid) -> Result<Job, CatalogError> {
        self.inner
            .read()
            .expect("catalog lock poisoned")
            .jobs
            .get(&uuid)
            .cloned()
            .ok_or(CatalogError::JobNotFound(uuid))
    }

    fn all(&self) -> Vec<Job> {
        self.inner
            .read()
            .expect("catalog lock poisoned")
            .jobs
            .values()
            .cloned()
            .collect()
    }

    fn statistics(&self) -> CatalogStatistics {
        let inner = self.inner.read().expect("catalog lock poisoned");
        let enabled_count = inner.jobs.values().filter(|j| j.enabled()).count();
        CatalogStatistics {
            count: inner.jobs.len(),
            enabled_count,
            disabled_count: inner.jobs.len() - enabled_count,
        }
    }

    fn get_schedulable(&self) -> Vec<Job> {
        let inner = self.inner.read().expect("catalog lock poisoned");
        inner
            .jobs
            .values()
            .filter(|job| {
                let count = inner.results.get(&job.uuid()).map_or(0, Vec::len);
                Self::is_schedulable(job, count)
            })
            .cloned()
            .collect()
    }

    fn get_not_schedulable(&self) -> Vec<Job> {
        let inner = self.inner.read().expect("catalog lock poisoned");
        inner
            .jobs
            .values()
            .filter(|job| {
                let count = inner.results.get(&job.uuid()).map_or(0, Vec::len);
                !Self::is_schedulable(job, count)
            })
            .cloned()
            .collect()
    }

    fn append_result(&self, result: JobResult) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("catalog lock poisoned");
        if !inner.jobs.contains_key(&result.uuid) {
            return Err(CatalogError::JobNotFound(result.uuid));
        }
        let history = inner.results.entry(result.uuid).or_default();
        history.push(Arc::new(result));
        let retention = self.result_retention;
        if history.len() > retention {
            let overflow = history.len() - retention;
            history.drain(0..overflow);
        }
        Ok(())
    }

    fn results(&self, uuid: Uuid) -> Result<Vec<Arc<JobResult>>, CatalogError> {
        let inner = self.inner.read().expect("catalog lock poisoned");
        if !inner.jobs.contains_key(&uuid) {
            return Err(CatalogError::JobNotFound(uuid));
        }
        Ok(inner.results.get(&uuid).cloned().unwrap_or_default())
    }

    fn result_count(&self, uuid: Uuid) -> usize {
        self.inner
            .read()
            .expect("catalog lock poisoned")
            .results
            .get(&uuid)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;
    use crate::task::library::EmptyTask;
    use std::sync::Arc;

    fn sample_job(uuid: Uuid) -> Job {
        Job::new(uuid, "demo", Schedule::every_second(), vec![Arc::new(EmptyTask)])
    }

    #[test]
    fn add_then_get_round_trips() {
        let catalog = InMemoryCatalog::new();
        let uuid = Uuid::new_v4();
        catalog.add(sample_job(uuid)).unwrap();
        assert_eq!(catalog.get(uuid).unwrap().uuid(), uuid);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let uuid = Uuid::new_v4();
        catalog.add(sample_job(uuid)).unwrap();
        assert_eq!(catalog.add(sample_job(uuid)), Err(CatalogError::DuplicateJob(uuid)));
    }

    #[test]
    fn job_with_no_run_limit_is_always_schedulable() {
        let catalog = InMemoryCatalog::new();
        let uuid = Uuid::new_v4();
        catalog.add(sample_job(uuid)).unwrap();
        assert_eq!(catalog.get_schedulable().len(), 1);
        assert!(catalog.get_not_schedulable().is_empty());
    }

    #[test]
    fn run_limited_job_becomes_not_schedulable_once_cap_is_reached() {
        // Boundary is `result_count <= max_runs`, so with max_runs=1 the job
        // stays schedulable through its first result (0 <= 1, then 1 <= 1)
        // and only drops out once a second result pushes the count past it.
        let catalog = InMemoryCatalog::new();
        let uuid = Uuid::new_v4();
        catalog.add(sample_job(uuid).with_max_runs(1)).unwrap();

        assert_eq!(catalog.get_schedulable().len(), 1);

        let append = || {
            catalog
                .append_result(JobResult {
                    uuid,
                    run_uuid: Uuid::new_v4(),
                    trigger: chrono::Utc::now(),
                    run_time: std::time::Duration::from_millis(1),
                    task_results: vec![],
                    error: None,
                })
                .unwrap();
        };

        append();
        assert_eq!(catalog.get_schedulable().len(), 1);
        assert!(catalog.get_not_schedulable().is_empty());

        append();
        assert!(catalog.get_schedulable().is_empty());
        assert_eq!(catalog.get_not_schedulable().len(), 1);
    }

    #[test]
    fn result_history_is_capped_to_retention() {
        let catalog = InMemoryCatalog::with_retention(2);
        let uuid = Uuid::new_v4();
        catalog.add(sample_job(uuid)).unwrap();

        for _ in 0..5 {
            catalog
                .append_result(JobResult {
                    uuid,
                    run_uuid: Uuid::new_v4(),
                    trigger: chrono::Utc::now(),
                    run_time: std::time::Duration::from_millis(1),
                    task_results: vec![],
                    error: None,
                })
                .unwrap();
        }

        assert_eq!(catalog.result_count(uuid), 2);
    }
}
