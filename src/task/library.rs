//! Small reference [`Task`] implementations, useful as test fixtures and as
//! a starting point for embedders writing their own tasks.

use std::time::Duration;

use log::log;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

use super::{Handler, HandlerPool, Task};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Does nothing and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTask;

impl Task for EmptyTask {
    fn name(&self) -> String {
        "EmptyTask".to_owned()
    }

    fn default_handler(&self) -> Handler {
        self.handler(DEFAULT_TIMEOUT)
    }

    fn default_handler_pool(&self, cancel: CancellationToken, workers: usize) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(DEFAULT_TIMEOUT),
            workers,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }

    fn handler(&self, timeout: Duration) -> Handler {
        Handler::new("EmptyTask", timeout, |_cancel, _task, _pipeline| async {
            Ok(())
        })
    }

    fn handler_pool(&self, cancel: CancellationToken, timeout: Duration) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(timeout),
            1,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }
}

/// Always fails with a fixed error. Useful for exercising error handling in
/// a sequence without depending on a real failing task.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyErrorTask;

impl Task for EmptyErrorTask {
    fn name(&self) -> String {
        "EmptyErrorTask".to_owned()
    }

    fn default_handler(&self) -> Handler {
        self.handler(DEFAULT_TIMEOUT)
    }

    fn default_handler_pool(&self, cancel: CancellationToken, workers: usize) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(DEFAULT_TIMEOUT),
            workers,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }

    fn handler(&self, timeout: Duration) -> Handler {
        Handler::new("EmptyErrorTask", timeout, |_cancel, _task, _pipeline| async {
            Err(TaskError::Domain("EmptyErrorTask".into()))
        })
    }

    fn handler_pool(&self, cancel: CancellationToken, timeout: Duration) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(timeout),
            1,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }
}

/// Emits one record through the `log` facade at the configured level.
#[derive(Debug, Clone)]
pub struct LogTask {
    pub level: log::Level,
    pub message: String,
}

impl Task for LogTask {
    fn name(&self) -> String {
        "LogTask".to_owned()
    }

    fn default_handler(&self) -> Handler {
        self.handler(DEFAULT_TIMEOUT)
    }

    fn default_handler_pool(&self, cancel: CancellationToken, workers: usize) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(DEFAULT_TIMEOUT),
            workers,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }

    fn handler(&self, timeout: Duration) -> Handler {
        let level = self.level;
        let message = self.message.clone();
        Handler::new("LogTask", timeout, move |_cancel, task, pipeline| {
            let level = level;
            let message = message.clone();
            async move {
                log!(level, "{}: {}", pipeline.scope(&*task), message);
                Ok(())
            }
        })
    }

    fn handler_pool(&self, cancel: CancellationToken, timeout: Duration) -> HandlerPool {
        HandlerPool::new(
            cancel,
            self.handler(timeout),
            1,
            None,
            std::sync::Arc::new(crate::metrics::Metrics::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Pipeline;
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_task_succeeds() {
        let task = EmptyTask;
        let (status, err) = task
            .default_handler()
            .execute(CancellationToken::new(), Arc::new(task), Arc::new(Pipeline::new()))
            .await;
        assert_eq!(status, crate::task::Status::Success);
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn empty_error_task_fails() {
        let task = EmptyErrorTask;
        let (status, err) = task
            .default_handler()
            .execute(CancellationToken::new(), Arc::new(task), Arc::new(Pipeline::new()))
            .await;
        assert_eq!(status, crate::task::Status::Error);
        assert!(err.is_some());
    }
}
