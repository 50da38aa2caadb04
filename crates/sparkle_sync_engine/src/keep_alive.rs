//! Periodic keep-alive task.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// Handle to a running keep-alive task.
///
/// The task calls its tick function once per period, first one period after
/// spawning. It stops on [`KeepAlive::stop`] or when the handle is dropped.
#[derive(Debug)]
pub struct KeepAlive {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Spawns the task on the current tokio runtime.
    ///
    /// Returns [`SyncError::NoRuntime`] when called outside a runtime.
    pub fn spawn<F>(period: Duration, mut tick: F) -> SyncResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let period = period.max(Duration::from_millis(1));
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        trace!("keep-alive tick");
                        tick();
                    }
                }
            }
        });

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Returns true until the task has been stopped.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the task. Later calls do nothing.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.shutdown.send(true);
            handle.abort();
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}
