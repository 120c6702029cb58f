//! A per-second clock that emits an instant onto an output channel whenever
//! its [`Schedule`] is due.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

use crate::error::TickerError;
use crate::schedule::Schedule;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives a [`Schedule`] against wall-clock time and forwards matching
/// instants to `out`. A `Ticker` can be started and stopped repeatedly, but
/// never concurrently: starting an already-running ticker, or stopping one
/// that isn't running, is an error.
pub struct Ticker {
    schedule: Schedule,
    out: Sender<DateTime<Utc>>,
    token: Mutex<Option<CancellationToken>>,
}

impl Ticker {
    pub fn new(schedule: Schedule, out: Sender<DateTime<Utc>>) -> Ticker {
        Ticker {
            schedule,
            out,
            token: Mutex::new(None),
        }
    }

    /// Spawns the tick loop as a child of `parent`. Returns `AlreadyStarted`
    /// if the ticker is already running.
    pub fn start(&self, parent: &CancellationToken) -> Result<(), TickerError> {
        let mut guard = self.token.lock().expect("ticker token mutex poisoned");
        // A token left behind by a parent-cancellation (rather than an
        // explicit `stop()`) is stale: the loop has already exited, so treat
        // it as absent instead of rejecting the restart.
        if matches!(guard.as_ref(), Some(token) if !token.is_cancelled()) {
            return Err(TickerError::AlreadyStarted);
        }
        let token = parent.child_token();
        *guard = Some(token.clone());
        drop(guard);

        let schedule = self.schedule.clone();
        let out = self.out.clone();
        tokio::spawn(run(schedule, out, token));
        Ok(())
    }

    /// Cancels the running tick loop. Returns `AlreadyStopped` if the ticker
    /// isn't running (including when the parent token was already canceled).
    pub fn stop(&self) -> Result<(), TickerError> {
        let mut guard = self.token.lock().expect("ticker token mutex poisoned");
        match guard.take() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                Ok(())
            }
            _ => Err(TickerError::AlreadyStopped),
        }
    }

    pub fn is_running(&self) -> bool {
        match &*self.token.lock().expect("ticker token mutex poisoned") {
            Some(token) => !token.is_cancelled(),
            None => false,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

async fn run(schedule: Schedule, out: Sender<DateTime<Utc>>, token: CancellationToken) {
    debug!("ticker started for schedule '{}'", schedule.as_str());
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            instant = interval.tick() => {
                let _ = instant;
                let now = Utc::now();
                if schedule.is_due(now) {
                    trace!("schedule '{}' due at {now}", schedule.as_str());
                    if out.send(now).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("ticker stopped for schedule '{}'", schedule.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stopping_unstarted_ticker_errors() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let ticker = Ticker::new(Schedule::every_second(), tx);
        assert_eq!(ticker.stop(), Err(TickerError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_errors() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let ticker = Ticker::new(Schedule::every_second(), tx);
        let token = CancellationToken::new();
        assert!(ticker.start(&token).is_ok());
        assert_eq!(ticker.start(&token), Err(TickerError::AlreadyStarted));
        ticker.stop().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn every_second_schedule_emits() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let ticker = Ticker::new(Schedule::every_second(), tx);
        let token = CancellationToken::new();
        ticker.start(&token).unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(rx.recv().await.is_some());

        ticker.stop().unwrap();
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_ticker_and_later_stop_errors() {
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let ticker = Ticker::new(Schedule::every_second(), tx);
        let token = CancellationToken::new();
        ticker.start(&token).unwrap();

        token.cancel();
        tokio::task::yield_now().await;

        assert_eq!(ticker.stop(), Err(TickerError::AlreadyStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_leaves_ticker_restartable_without_calling_stop() {
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let ticker = Ticker::new(Schedule::every_second(), tx);
        let token = CancellationToken::new();
        ticker.start(&token).unwrap();

        token.cancel();
        tokio::task::yield_now().await;
        assert!(!ticker.is_running());

        // No `stop()` call here: the loop exited on its own via parent
        // cancellation, and `start()` must still accept a fresh token.
        let fresh = CancellationToken::new();
        assert!(ticker.start(&fresh).is_ok());
        assert!(ticker.is_running());
        ticker.stop().unwrap();
    }
}
