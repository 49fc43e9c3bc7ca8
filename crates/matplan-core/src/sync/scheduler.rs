//! Connectivity-driven trigger source.
//!
//! The scheduler owns the retry policy so the engine never sleeps: connectivity
//! transitions and explicit sync requests arrive as [`SyncTrigger`] messages,
//! drains run only while online, and an interrupted pass is retried with
//! bounded exponential backoff until the budget for that trigger is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sync::engine::{DrainOutcome, SyncEngine};
use crate::sync::remote::RemoteDataService;

/// Signals consumed by the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity was regained; drain whatever queued up while offline
    Online,
    /// Connectivity was lost; pause drains until the next [`SyncTrigger::Online`]
    Offline,
    /// A client asked for a sync (e.g. after a local write)
    SyncRequested,
}

/// Backoff applied to interrupted drain passes.
///
/// `max_attempts` counts the initial pass, so the default of 5 means one
/// drain plus up to four retries per trigger. The budget resets on the next
/// trigger.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Delay before retry number `retry` (1-based), or `None` once the
    /// attempt budget is spent.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_attempts {
            return None;
        }
        let exp = retry.saturating_sub(1).min(16);
        Some(self.base.saturating_mul(1 << exp).min(self.cap))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 5)
    }
}

/// Handle to the scheduler task. Dropping the handle stops the task once
/// its channel drains.
pub struct SyncScheduler {
    tx: mpsc::UnboundedSender<SyncTrigger>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the scheduler task with the default retry policy.
    pub fn spawn<R>(engine: Arc<SyncEngine<R>>) -> Self
    where
        R: RemoteDataService + 'static,
    {
        Self::spawn_with_policy(engine, RetryPolicy::default())
    }

    pub fn spawn_with_policy<R>(engine: Arc<SyncEngine<R>>, policy: RetryPolicy) -> Self
    where
        R: RemoteDataService + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(engine, policy, rx));
        Self { tx, task }
    }

    pub fn notify_online(&self) {
        self.send(SyncTrigger::Online);
    }

    pub fn notify_offline(&self) {
        self.send(SyncTrigger::Offline);
    }

    pub fn request_sync(&self) {
        self.send(SyncTrigger::SyncRequested);
    }

    fn send(&self, trigger: SyncTrigger) {
        if self.tx.send(trigger).is_err() {
            tracing::warn!(?trigger, "sync scheduler task is gone, trigger dropped");
        }
    }

    /// Stop the scheduler and wait for the task to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

async fn run<R: RemoteDataService>(
    engine: Arc<SyncEngine<R>>,
    policy: RetryPolicy,
    mut rx: mpsc::UnboundedReceiver<SyncTrigger>,
) {
    let mut online = false;
    while let Some(trigger) = rx.recv().await {
        match trigger {
            SyncTrigger::Offline => {
                online = false;
                tracing::debug!("connectivity lost, drains paused");
                continue;
            }
            SyncTrigger::Online => {
                online = true;
                tracing::debug!("connectivity restored");
            }
            SyncTrigger::SyncRequested => {
                if !online {
                    tracing::debug!("sync requested while offline, deferred");
                    continue;
                }
            }
        }

        let mut retry = 0u32;
        loop {
            match engine.trigger().await {
                Ok(Some(report)) if report.outcome == DrainOutcome::Interrupted => {
                    retry += 1;
                    let Some(delay) = policy.delay(retry) else {
                        tracing::warn!(
                            remaining = report.remaining,
                            "retry budget spent, waiting for the next trigger"
                        );
                        break;
                    };
                    tracing::debug!(
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        remaining = report.remaining,
                        "drain interrupted, backing off"
                    );
                    // Stay responsive to connectivity changes during backoff.
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        msg = rx.recv() => match msg {
                            Some(SyncTrigger::Offline) => {
                                online = false;
                                tracing::debug!("connectivity lost during backoff");
                                break;
                            }
                            None => return,
                            Some(_) => {}
                        },
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    tracing::error!(error = %e, "drain pass failed");
                    break;
                }
            }
        }
    }
}
