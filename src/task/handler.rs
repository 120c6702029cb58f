use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

use super::{Pipeline, Status, Task};

/// A boxed, type-erased future, since [`Task`] handler functions must be
/// object-safe to live behind an `Arc<dyn Fn(...) -> _>`.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

type ExecuteFn =
    dyn Fn(CancellationToken, Arc<dyn Task>, Arc<Pipeline>) -> HandlerFuture + Send + Sync;

/// A named, timeout-bounded function that runs one task. Immutable once
/// constructed; cheap to clone since the function body is reference-counted.
#[derive(Clone)]
pub struct Handler {
    name: String,
    timeout: Duration,
    execute_fn: Arc<ExecuteFn>,
}

impl Handler {
    pub fn new<F, Fut>(name: impl Into<String>, timeout: Duration, f: F) -> Handler
    where
        F: Fn(CancellationToken, Arc<dyn Task>, Arc<Pipeline>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Handler {
            name: name.into(),
            timeout,
            execute_fn: Arc::new(move |cancel, task, pipeline| {
                Box::pin(f(cancel, task, pipeline)) as HandlerFuture
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the handler function under `timeout`, composed with `cancel`.
    /// The function body runs in its own spawned task so that a timeout or
    /// cancellation does not have to wait for it: its result is delivered
    /// over a buffered-1 channel whose send never blocks once nobody is
    /// listening anymore.
    pub async fn execute(
        &self,
        cancel: CancellationToken,
        task: Arc<dyn Task>,
        pipeline: Arc<Pipeline>,
    ) -> (Status, Option<TaskError>) {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        let fut = (self.execute_fn)(cancel.clone(), task, pipeline);
        tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(result).await;
        });

        tokio::select! {
            _ = cancel.cancelled() => (Status::Canceled, Some(TaskError::HandlerCanceled)),
            _ = tokio::time::sleep(self.timeout) => {
                (Status::Canceled, Some(TaskError::HandlerTimeout(self.timeout)))
            }
            received = rx.recv() => match received {
                Some(Ok(())) => (Status::Success, None),
                Some(Err(err)) => (Status::Error, Some(err)),
                None => (Status::Canceled, Some(TaskError::HandlerCanceled)),
            },
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::library::EmptyTask;

    #[tokio::test]
    async fn successful_execution_reports_success() {
        let handler = Handler::new("t", Duration::from_secs(1), |_cancel, _task, _pipeline| async {
            Ok(())
        });
        let (status, err) = handler
            .execute(
                CancellationToken::new(),
                Arc::new(EmptyTask),
                Arc::new(Pipeline::new()),
            )
            .await;
        assert_eq!(status, Status::Success);
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn erroring_handler_reports_error() {
        let handler = Handler::new("t", Duration::from_secs(1), |_cancel, _task, _pipeline| async {
            Err(TaskError::Domain("boom".into()))
        });
        let (status, err) = handler
            .execute(
                CancellationToken::new(),
                Arc::new(EmptyTask),
                Arc::new(Pipeline::new()),
            )
            .await;
        assert_eq!(status, Status::Error);
        assert!(err.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_as_canceled() {
        let handler = Handler::new("t", Duration::from_millis(10), |_cancel, _task, _pipeline| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        let (status, err) = handler
            .execute(
                CancellationToken::new(),
                Arc::new(EmptyTask),
                Arc::new(Pipeline::new()),
            )
            .await;
        assert_eq!(status, Status::Canceled);
        assert!(matches!(err, Some(TaskError::HandlerTimeout(_))));
    }

    #[tokio::test]
    async fn parent_cancellation_is_reported_as_canceled() {
        let handler = Handler::new("t", Duration::from_secs(5), |_cancel, _task, _pipeline| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        });
        let token = CancellationToken::new();
        token.cancel();
        let (status, err) = handler
            .execute(token, Arc::new(EmptyTask), Arc::new(Pipeline::new()))
            .await;
        assert_eq!(status, Status::Canceled);
        assert!(matches!(err, Some(TaskError::HandlerCanceled)));
    }
}
