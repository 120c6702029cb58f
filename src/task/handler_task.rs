use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use crate::error::TaskError;

use super::{Pipeline, Status, Task};

/// Envelope sent into a [`super::HandlerPool`]: the task to run, the shared
/// pipeline it runs against, and where to deliver the outcome.
pub struct HandlerTask {
    pub task: Arc<dyn Task>,
    pub pipeline: Arc<Pipeline>,
    pub result_tx: Option<Sender<HandlerResult>>,
}

impl HandlerTask {
    pub fn new(task: Arc<dyn Task>, pipeline: Arc<Pipeline>) -> HandlerTask {
        HandlerTask {
            task,
            pipeline,
            result_tx: None,
        }
    }

    pub fn with_result_channel(
        task: Arc<dyn Task>,
        pipeline: Arc<Pipeline>,
        result_tx: Sender<HandlerResult>,
    ) -> HandlerTask {
        HandlerTask {
            task,
            pipeline,
            result_tx: Some(result_tx),
        }
    }
}

/// Outcome of running one [`HandlerTask`] through its handler.
#[derive(Debug)]
pub struct HandlerResult {
    pub task_name: String,
    pub status: Status,
    pub error: Option<TaskError>,
}
