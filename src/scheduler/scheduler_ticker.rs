use uuid::Uuid;

use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::error::TickerError;
use crate::schedule::Schedule;
use crate::ticker::Ticker;

use super::message::SchedulerTick;

/// Wraps one [`Ticker`] for a single job, tagging and forwarding each
/// matching instant onto the scheduler's shared aggregate stream.
pub struct SchedulerTicker {
    uuid: Uuid,
    ticker: Ticker,
}

impl SchedulerTicker {
    pub fn new(uuid: Uuid, schedule: Schedule, out_aggregate: Sender<SchedulerTick>) -> SchedulerTicker {
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        tokio::spawn(async move {
            while let Some(time) = rx.recv().await {
                if out_aggregate.send(SchedulerTick { uuid, time }).await.is_err() {
                    break;
                }
            }
        });

        SchedulerTicker {
            uuid,
            ticker: Ticker::new(schedule, tx),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn schedule(&self) -> &Schedule {
        self.ticker.schedule()
    }

    pub fn start(&self, parent: &CancellationToken) -> Result<(), TickerError> {
        self.ticker.start(parent)
    }

    pub fn stop(&self) -> Result<(), TickerError> {
        self.ticker.stop()
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }
}
