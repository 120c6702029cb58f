//! Reconciles per-job enable/disable/schedule state into running
//! [`SchedulerTicker`]s and fans their matches into one aggregate stream.

mod message;
mod scheduler_ticker;

pub use message::{SchedulerMessage, SchedulerTick};
pub use scheduler_ticker::SchedulerTicker;

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, trace, warn};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SchedulerError;

/// Owns one [`SchedulerTicker`] per job uuid and reconciles them against
/// inbound [`SchedulerMessage`]s.
pub struct Scheduler {
    message_tx: mpsc::Sender<SchedulerMessage>,
    message_rx: AsyncMutex<Option<mpsc::Receiver<SchedulerMessage>>>,
    tick_tx: mpsc::Sender<SchedulerTick>,
    start_timeout: Duration,
    running: std::sync::atomic::AtomicBool,
}

impl Scheduler {
    /// Builds a scheduler whose aggregate tick stream is `tick_tx` and whose
    /// inbound reconciliation channel is buffered to `message_buffer`.
    pub fn new(tick_tx: mpsc::Sender<SchedulerTick>, message_buffer: usize, start_timeout: Duration) -> Scheduler {
        let (message_tx, message_rx) = mpsc::channel(message_buffer);
        Scheduler {
            message_tx,
            message_rx: AsyncMutex::new(Some(message_rx)),
            tick_tx,
            start_timeout,
            running: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<SchedulerMessage> {
        self.message_tx.clone()
    }

    /// Starts the reconciliation listener under a child of `parent`. Returns
    /// once the listener has signaled readiness, or `SchedulerStartTimeout`
    /// if it doesn't within `start_timeout`.
    pub async fn start(&self, parent: &CancellationToken) -> Result<(), SchedulerError> {
        let mut guard = self.message_rx.lock().await;
        let message_rx = guard.take().expect("scheduler already started");
        drop(guard);

        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
        let token = parent.child_token();
        let tick_tx = self.tick_tx.clone();

        tokio::spawn(listen(token, message_rx, tick_tx, ready_tx));

        match tokio::time::timeout(self.start_timeout, ready_rx).await {
            Ok(_) => {
                self.running.store(true, std::sync::atomic::Ordering::SeqCst);
                debug!("scheduler started");
                Ok(())
            }
            Err(_) => Err(SchedulerError::SchedulerStartTimeout),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }
}

async fn listen(
    token: CancellationToken,
    mut message_rx: mpsc::Receiver<SchedulerMessage>,
    tick_tx: mpsc::Sender<SchedulerTick>,
    ready_tx: tokio::sync::oneshot::Sender<()>,
) {
    let tickers: AsyncMutex<HashMap<Uuid, SchedulerTicker>> = AsyncMutex::new(HashMap::new());
    let _ = ready_tx.send(());

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = message_rx.recv() => {
                match received {
                    Some(message) => reconcile(&tickers, &token, &tick_tx, message).await,
                    None => break,
                }
            }
        }
    }

    debug!("scheduler stopping, cancelling all tickers");
    for (_, ticker) in tickers.lock().await.drain() {
        let _ = ticker.stop();
    }
}

async fn reconcile(
    tickers: &AsyncMutex<HashMap<Uuid, SchedulerTicker>>,
    parent: &CancellationToken,
    tick_tx: &mpsc::Sender<SchedulerTick>,
    message: SchedulerMessage,
) {
    let mut tickers = tickers.lock().await;

    match (tickers.get(&message.uuid), message.enabled) {
        (None, false) => {
            trace!("scheduler: ignoring disable for unknown job {}", message.uuid);
        }
        (None, true) => {
            let ticker = SchedulerTicker::new(message.uuid, message.schedule, tick_tx.clone());
            if let Err(err) = ticker.start(parent) {
                warn!("scheduler: failed to start ticker for {}: {err}", message.uuid);
                return;
            }
            tickers.insert(message.uuid, ticker);
        }
        (Some(_), false) => {
            if let Some(ticker) = tickers.remove(&message.uuid) {
                let _ = ticker.stop();
            }
        }
        (Some(existing), true) => {
            if existing.schedule().as_str() != message.schedule.as_str() {
                if let Some(old) = tickers.remove(&message.uuid) {
                    let _ = old.stop();
                }
                let ticker = SchedulerTicker::new(message.uuid, message.schedule, tick_tx.clone());
                if let Err(err) = ticker.start(parent) {
                    warn!("scheduler: failed to restart ticker for {}: {err}", message.uuid);
                    return;
                }
                tickers.insert(message.uuid, ticker);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Schedule;

    #[tokio::test(start_paused = true)]
    async fn enabling_an_unknown_job_creates_and_starts_a_ticker() {
        let (tick_tx, mut tick_rx) = mpsc::channel(4);
        let scheduler = Scheduler::new(tick_tx, 4, Duration::from_secs(1));
        let parent = CancellationToken::new();
        scheduler.start(&parent).await.unwrap();

        let uuid = Uuid::new_v4();
        scheduler
            .sender()
            .send(SchedulerMessage {
                uuid,
                enabled: true,
                schedule: Schedule::every_second(),
            })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        let tick = tick_rx.recv().await.unwrap();
        assert_eq!(tick.uuid, uuid);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_stops_emission() {
        let (tick_tx, mut tick_rx) = mpsc::channel(4);
        let scheduler = Scheduler::new(tick_tx, 4, Duration::from_secs(1));
        let parent = CancellationToken::new();
        scheduler.start(&parent).await.unwrap();

        let uuid = Uuid::new_v4();
        let sender = scheduler.sender();
        sender
            .send(SchedulerMessage {
                uuid,
                enabled: true,
                schedule: Schedule::every_second(),
            })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        tick_rx.recv().await.unwrap();

        sender
            .send(SchedulerMessage {
                uuid,
                enabled: false,
                schedule: Schedule::every_second(),
            })
            .await
            .unwrap();
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(tick_rx.try_recv().is_err());
    }
}
