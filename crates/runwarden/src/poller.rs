use runwarden_core::ProcessManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::supervisor::{ProgramStatus, Supervisor};

/// How long `stop` waits for an in-flight tick before aborting the task
pub const POLLER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerShutdown {
    /// The task noticed cancellation and returned
    Clean,
    /// The task overran the shutdown timeout and was aborted
    Aborted,
    /// The task had already died from a panic
    Panicked,
}

/// Periodically refreshes every program's liveness and hands the resulting
/// snapshot to a callback.
///
/// The first refresh happens immediately. Once [`LivenessPoller::stop`]
/// returns, the callback is never invoked again.
pub struct LivenessPoller {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    interval: Duration,
}

impl LivenessPoller {
    pub fn spawn<M, F>(supervisor: Arc<Supervisor<M>>, interval: Duration, mut on_snapshot: F) -> Self
    where
        M: ProcessManager + 'static,
        F: FnMut(Vec<ProgramStatus>) + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                supervisor.refresh_all().await;
                if cancelled.is_cancelled() {
                    break;
                }
                on_snapshot(supervisor.snapshot());
            }
            debug!("Liveness poller finished");
        });

        debug!(?interval, "Liveness poller started");
        Self {
            token,
            task: Some(task),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the poller and wait a bounded time for it to wind down.
    pub async fn stop(mut self) -> PollerShutdown {
        self.token.cancel();
        let Some(mut task) = self.task.take() else {
            return PollerShutdown::Clean;
        };

        match tokio::time::timeout(POLLER_SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => PollerShutdown::Clean,
            Ok(Err(e)) => {
                error!(error = %e, "Liveness poller task failed");
                PollerShutdown::Panicked
            }
            Err(_) => {
                warn!(timeout = ?POLLER_SHUTDOWN_TIMEOUT, "Liveness poller did not stop in time, aborting");
                task.abort();
                PollerShutdown::Aborted
            }
        }
    }
}

impl Drop for LivenessPoller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
