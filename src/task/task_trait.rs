use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{Handler, HandlerPool};

/// A unit of work that can be run through a [`HandlerPool`]. Implementors are
/// typically small, cheaply-cloneable structs that carry whatever data the
/// handler function needs; the trait itself only describes how to obtain the
/// handler that executes them.
///
/// `name()` doubles as the registry key of the task's handler pool in a
/// [`super::HandlerRepository`], so tasks of the same kind must return the
/// same name.
pub trait Task: Send + Sync {
    fn name(&self) -> String;

    fn default_handler(&self) -> Handler;

    fn default_handler_pool(&self, cancel: CancellationToken, workers: usize) -> HandlerPool;

    fn handler(&self, timeout: Duration) -> Handler;

    fn handler_pool(&self, cancel: CancellationToken, timeout: Duration) -> HandlerPool;
}
