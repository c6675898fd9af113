//! Fire-and-forget work scheduled after a request has already succeeded.
//!
//! Every effect runs in its own task with its own error boundary: a failure
//! is logged and dropped, never retried, and never reaches the caller that
//! scheduled it.

use std::future::Future;

use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct SideEffects {
    tracker: TaskTracker,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `effect` in the background. `name` and `subject` label log lines.
    pub fn spawn<F>(&self, name: &'static str, subject: String, effect: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match effect.await {
                Ok(()) => tracing::debug!(effect = name, %subject, "side effect completed"),
                Err(err) => tracing::warn!(
                    effect = name,
                    %subject,
                    error = %format!("{err:#}"),
                    "side effect failed"
                ),
            }
        });
    }

    /// Number of effects still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every effect spawned so far has finished. New effects may
    /// be spawned again afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
