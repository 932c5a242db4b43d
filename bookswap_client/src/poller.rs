use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::session::{Session, SessionStore};

/// Background task running `tick` on a fixed interval while a session is active.
///
/// Ticks never overlap: a slow tick delays the next one and missed ticks are skipped.
/// Polling pauses while nobody is signed in and restarts with an immediate tick
/// whenever a session is set. The task ends when the handle is cancelled or dropped.
/// A tick still running at that moment is dropped, so nothing is written after teardown.
pub struct PollingTask {
    name: &'static str,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollingTask {
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        session: &SessionStore,
        tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancellation_token = CancellationToken::new();
        let handle = tokio::spawn(poll(
            name,
            period,
            session.watch(),
            cancellation_token.clone(),
            tick,
        ));

        Self {
            name,
            cancellation_token,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Cancels the task and waits until it is gone
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(task = self.name, "Polling task ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

fn session_active(session_watch: &watch::Receiver<Option<Session>>) -> bool {
    session_watch.borrow().is_some()
}

fn schedule(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn poll<F, Fut>(
    name: &'static str,
    period: Duration,
    mut session_watch: watch::Receiver<Option<Session>>,
    token: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = schedule(period);
    let mut tick_no: u64 = 0;

    loop {
        if !session_active(&session_watch) {
            tracing::info!(task = name, "No active session, polling paused");
            while !session_active(&session_watch) {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::info!(task = name, "Polling cancelled");
                        return;
                    }
                    changed = session_watch.changed() => {
                        if changed.is_err() {
                            tracing::info!(task = name, "Session store dropped, polling stopped");
                            return;
                        }
                    }
                }
            }
            tracing::info!(task = name, "Session started, polling resumed");
            interval = schedule(period);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(task = name, "Polling cancelled");
                return;
            }
            changed = session_watch.changed() => {
                if changed.is_err() {
                    tracing::info!(task = name, "Session store dropped, polling stopped");
                    return;
                }
                // Another session starts with a fresh schedule
                interval = schedule(period);
                continue;
            }
            _ = interval.tick() => {}
        }

        tracing::debug!(task = name, tick_no, "Polling tick");
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::info!(task = name, "Polling cancelled during tick");
                return;
            }
            _ = tick() => {}
        }
        tick_no += 1;
    }
}
