use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::SequenceError;

use super::{HandlerRepository, HandlerTask, Pipeline, Status, Task};

/// Outcome of running one task within a sequence.
#[derive(Debug)]
pub struct TaskResult {
    pub task_name: String,
    pub status: Status,
    pub error: Option<crate::error::TaskError>,
}

/// Runs `tasks` serially through `repository`, sharing one [`Pipeline`]
/// across all of them. A per-task error does not abort the sequence; it is
/// recorded in that task's result and execution continues. Only a
/// submission failure or cancellation stops the sequence early.
pub async fn execute_sequence(
    cancel: CancellationToken,
    tasks: Vec<Arc<dyn Task>>,
    repository: &HandlerRepository,
) -> (Vec<TaskResult>, Option<SequenceError>) {
    let pipeline = Arc::new(Pipeline::new());
    let mut results = Vec::with_capacity(tasks.len());

    for task in tasks {
        let task_name = task.name();
        let (result_tx, mut result_rx) = tokio::sync::mpsc::channel(1);

        if let Err(err) = repository
            .execute(
                cancel.clone(),
                HandlerTask::with_result_channel(task, pipeline.clone(), result_tx),
            )
            .await
        {
            return (results, Some(SequenceError::Repository(err)));
        }

        tokio::select! {
            _ = cancel.cancelled() => return (results, Some(SequenceError::Canceled)),
            received = result_rx.recv() => {
                match received {
                    Some(result) => results.push(TaskResult {
                        task_name,
                        status: result.status,
                        error: result.error,
                    }),
                    None => return (results, Some(SequenceError::Canceled)),
                }
            }
        }
    }

    (results, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::task::library::{EmptyErrorTask, EmptyTask};

    #[tokio::test]
    async fn mixed_status_sequence_records_every_result() {
        let repo = HandlerRepository::new("test", Arc::new(Metrics::new()));
        let tasks: Vec<Arc<dyn Task>> = vec![Arc::new(EmptyTask), Arc::new(EmptyErrorTask), Arc::new(EmptyTask)];

        let (results, err) = execute_sequence(CancellationToken::new(), tasks, &repo).await;

        assert!(err.is_none());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, Status::Success);
        assert_eq!(results[1].status, Status::Error);
        assert_eq!(results[2].status, Status::Success);
    }

    #[tokio::test]
    async fn cancellation_before_any_task_stops_sequence_early() {
        let repo = HandlerRepository::new("test", Arc::new(Metrics::new()));
        let tasks: Vec<Arc<dyn Task>> = vec![Arc::new(EmptyTask), Arc::new(EmptyTask)];
        let cancel = CancellationToken::new();
        cancel.cancel();

        // An already-cancelled token can short-circuit either at submission
        // (the auto-registered pool's plumbing tears itself down immediately)
        // or while awaiting the first result; either way the sequence must
        // not run both tasks to completion.
        let (results, err) = execute_sequence(cancel, tasks, &repo).await;
        assert!(err.is_some());
        assert!(results.len() <= 1);
    }
}
