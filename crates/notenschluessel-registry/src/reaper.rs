//! Background sweeping of expired registry entries.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::registry::TtlRegistry;

/// Something a [`Reaper`] can sweep.
pub trait Sweep: Send + Sync + 'static {
    /// Remove expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

impl<K, V, C> Sweep for TtlRegistry<K, V, C>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    C: Clock,
{
    fn sweep(&self) -> usize {
        TtlRegistry::sweep(self)
    }
}

/// Periodic task that sweeps one registry on a fixed interval.
///
/// The task holds nothing but a reference to its target. It runs until
/// [`stop`](Self::stop) is called or the `Reaper` is dropped; at process exit
/// it is simply abandoned.
#[derive(Debug)]
pub struct Reaper {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Start sweeping `target` every `interval` on the current tokio runtime.
    ///
    /// The first sweep happens one full interval after the call.
    pub fn spawn(name: &'static str, target: Arc<dyn Sweep>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "{name} reaper interval must be non-zero"
            )));
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = target.sweep();
                        trace!(reaper = name, removed, "Sweep finished");
                    }
                }
            }

            debug!(reaper = name, "Reaper stopped");
        });

        debug!(reaper = name, interval_secs = interval.as_secs_f64(), "Reaper started");

        Ok(Self {
            name,
            token,
            task: Some(task),
        })
    }

    /// Label used in log events.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to exit after its current sweep.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
