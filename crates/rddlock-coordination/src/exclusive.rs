//! Bounded execution under a lock.

use std::future::Future;
use std::time::Duration;

use rddlock_kv::KeyValueStore;
use rddlock_time::NANOS_PER_MILLI;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::DeadlineExceededSnafu;
use crate::error::LockError;
use crate::error::WorkPanickedSnafu;
use crate::lock::LockClient;
use crate::verified::compute_run_deadline_ns;

impl<S: KeyValueStore + ?Sized + 'static> LockClient<S> {
    /// Run `work` while holding `key`, bounded by the lease.
    ///
    /// The lock is acquired with the configured attempt budget; on failure
    /// `work` never starts. `work` runs as its own Tokio task and is raced
    /// against a deadline of `min(lease_ms, time left on the token)`. When the
    /// deadline wins the cancellation token is triggered and the task is left
    /// running; it is expected to observe the token and stop.
    ///
    /// The lock is released on every exit path. If this future is dropped
    /// the guard releases in the background and `work` is cancelled.
    pub async fn run_exclusive<F, Fut, T>(&self, key: &str, lease_ms: u64, work: F) -> Result<T, LockError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.lock(key, lease_ms).await?;

        let remaining_ns = u64::try_from(guard.remaining().as_nanos()).unwrap_or(u64::MAX);
        let deadline_ns = compute_run_deadline_ns(lease_ms, remaining_ns);
        let deadline_ms = deadline_ns / NANOS_PER_MILLI;

        let cancel = CancellationToken::new();
        let _cancel_on_exit = cancel.clone().drop_guard();
        let mut task = tokio::spawn(work(cancel.clone()));

        debug!(key = %key, deadline_ms, "running work under lock");

        let result: Result<T, LockError> = tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "work under lock did not complete");
                    WorkPanickedSnafu { key, reason: e.to_string() }.fail()
                }
            },
            _ = tokio::time::sleep(Duration::from_nanos(deadline_ns)) => {
                cancel.cancel();
                warn!(key = %key, deadline_ms, "work exceeded lease deadline, cancelled");
                DeadlineExceededSnafu { key, deadline_ms }.fail()
            }
        };

        let outcome = guard.release().await;
        debug!(key = %key, ?outcome, "released lock after work");
        result
    }
}
