//! In-memory FIFO of scheduler ticks awaiting dispatch.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::QueueError;
use crate::scheduler::SchedulerTick;

/// Storage contract for the queue between the scheduler and the dispatcher,
/// expressed as a trait so the in-memory FIFO can be swapped out.
pub trait Queue: Send + Sync {
    fn push(&self, tick: SchedulerTick);
    fn pop(&self) -> Result<SchedulerTick, QueueError>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// FIFO queue guarded by a blocking mutex, never held across an `.await`.
#[derive(Default)]
pub struct InMemoryQueue {
    items: Mutex<VecDeque<SchedulerTick>>,
}

impl InMemoryQueue {
    pub fn new() -> InMemoryQueue {
        InMemoryQueue::default()
    }
}

impl Queue for InMemoryQueue {
    fn push(&self, tick: SchedulerTick) {
        self.items.lock().expect("queue lock poisoned").push_back(tick);
    }

    fn pop(&self) -> Result<SchedulerTick, QueueError> {
        self.items
            .lock()
            .expect("queue lock poisoned")
            .pop_front()
            .ok_or(QueueError::Empty)
    }

    fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tick() -> SchedulerTick {
        SchedulerTick {
            uuid: Uuid::new_v4(),
            time: Utc::now(),
        }
    }

    #[test]
    fn pop_on_empty_queue_errors() {
        let q = InMemoryQueue::new();
        assert_eq!(q.pop(), Err(QueueError::Empty));
    }

    #[test]
    fn push_then_pop_is_fifo() {
        let q = InMemoryQueue::new();
        let first = tick();
        let second = tick();
        q.push(first.clone());
        q.push(second.clone());
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap().uuid, first.uuid);
        assert_eq!(q.pop().unwrap().uuid, second.uuid);
        assert!(q.is_empty());
    }
}
