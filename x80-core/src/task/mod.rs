//! Supervised group of background loops.
//!
//! Every loop of a session is spawned through one [`TaskGroup`]. The group
//! owns a single `CancellationToken` that each loop observes, and
//! [`TaskGroup::shutdown`] cancels it and joins every loop before the
//! caller is allowed to release sockets.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a group shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Loops that returned on their own after cancellation.
    pub joined: Vec<&'static str>,
    /// Loops that had to be aborted after the grace period.
    pub aborted: Vec<&'static str>,
    /// Loops that had panicked.
    pub panicked: Vec<&'static str>,
}

struct NamedTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct TaskGroup {
    token: CancellationToken,
    tasks: Vec<NamedTask>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// The group's stop signal. Clones share the same state.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a loop. `f` receives the group's stop signal.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = f(self.token.clone());
        let handle = tokio::spawn(async move {
            fut.await;
            debug!(task = name, "loop exited");
        });
        self.tasks.push(NamedTask { name, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Raise the stop signal without waiting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and join every loop. Loops still running after `grace` are
    /// aborted. Calling this again is a no-op.
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        self.token.cancel();
        let mut report = ShutdownReport::default();

        for NamedTask { name, mut handle } in self.tasks.drain(..) {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => report.joined.push(name),
                Ok(Err(e)) if e.is_panic() => {
                    warn!(task = name, "loop panicked: {e}");
                    report.panicked.push(name);
                }
                Ok(Err(_)) => report.aborted.push(name),
                Err(_) => {
                    warn!(task = name, ?grace, "loop did not stop in time; aborting");
                    handle.abort();
                    let _ = handle.await;
                    report.aborted.push(name);
                }
            }
        }

        report
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.token.cancel();
        for task in &self.tasks {
            task.handle.abort();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
