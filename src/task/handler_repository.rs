use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::metrics::Metrics;

use super::{HandlerPool, HandlerPoolStatistics, HandlerTask};

/// Maps a task kind's name to the [`HandlerPool`] that runs it. Unknown task
/// kinds auto-register their default pool on first use.
pub struct HandlerRepository {
    name: String,
    pools: RwLock<HashMap<String, HandlerPool>>,
    metrics: Arc<Metrics>,
    default_pool_workers: usize,
}

impl HandlerRepository {
    pub fn new(name: impl Into<String>, metrics: Arc<Metrics>) -> HandlerRepository {
        HandlerRepository::with_default_pool_workers(name, metrics, 0)
    }

    /// As [`HandlerRepository::new`], but auto-registered default pools are
    /// sized to `default_pool_workers` (0 falls back to available
    /// parallelism, per [`HandlerPool::new`]) instead of a single worker.
    pub fn with_default_pool_workers(
        name: impl Into<String>,
        metrics: Arc<Metrics>,
        default_pool_workers: usize,
    ) -> HandlerRepository {
        HandlerRepository {
            name: name.into(),
            pools: RwLock::new(HashMap::new()),
            metrics,
            default_pool_workers,
        }
    }

    /// Registers every pool in `pools`. First-write-wins: an existing name is
    /// left untouched rather than replaced.
    pub async fn register_handler_pools(
        &self,
        pools: Vec<HandlerPool>,
    ) -> Result<(), RepositoryError> {
        for pool in pools {
            self.register_handler_pool(pool).await?;
        }
        Ok(())
    }

    pub async fn register_handler_pool(&self, pool: HandlerPool) -> Result<(), RepositoryError> {
        let mut pools = self.pools.write().await;
        pools.entry(pool.name().to_owned()).or_insert(pool);
        self.metrics.set_handlerpools_total(&self.name, pools.len());
        Ok(())
    }

    /// Submits `task` for execution, auto-registering the task's default
    /// handler pool if no pool is yet registered under its name.
    pub async fn execute(
        &self,
        cancel: tokio_util::sync::CancellationToken,
        task: HandlerTask,
    ) -> Result<(), RepositoryError> {
        let name = task.task.name();

        if self.pools.read().await.contains_key(&name) {
            return self.submit(&name, task).await;
        }

        let default_pool = task.task.default_handler_pool(cancel, self.default_pool_workers);
        self.register_handler_pool(default_pool).await?;
        self.submit(&name, task).await
    }

    async fn submit(&self, name: &str, task: HandlerTask) -> Result<(), RepositoryError> {
        let pools = self.pools.read().await;
        let pool = pools
            .get(name)
            .ok_or_else(|| RepositoryError::NoHandlerForTask(name.to_owned()))?;
        pool.submit(task)
            .await
            .map_err(|_| RepositoryError::PoolShutDown(name.to_owned()))
    }

    pub async fn statistics(&self) -> HashMap<String, HandlerPoolStatistics> {
        self.pools
            .read()
            .await
            .iter()
            .map(|(name, pool)| (name.clone(), pool.statistics()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Handler, Pipeline};
    use crate::task::library::EmptyTask;
    use std::time::Duration;

    #[tokio::test]
    async fn unregistered_task_auto_registers_default_pool() {
        let repo = HandlerRepository::new("test", Arc::new(Metrics::new()));
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let cancel = tokio_util::sync::CancellationToken::new();

        repo.execute(
            cancel,
            HandlerTask::with_result_channel(
                Arc::new(EmptyTask),
                Arc::new(Pipeline::new()),
                tx,
            ),
        )
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.status, crate::task::Status::Success);

        let stats = repo.statistics().await;
        assert!(stats.contains_key("EmptyTask"));
    }

    #[tokio::test]
    async fn registering_same_name_twice_is_a_no_op() {
        let repo = HandlerRepository::new("test", Arc::new(Metrics::new()));
        let cancel = tokio_util::sync::CancellationToken::new();

        let handler = Handler::new("dup", Duration::from_secs(1), |_, _, _| async { Ok(()) });
        let first = HandlerPool::new(cancel.clone(), handler.clone(), 1, None, Arc::new(Metrics::new()));
        let second = HandlerPool::new(cancel, handler, 1, None, Arc::new(Metrics::new()));

        repo.register_handler_pool(first).await.unwrap();
        repo.register_handler_pool(second).await.unwrap();

        assert_eq!(repo.statistics().await.len(), 1);
    }
}
