//! Single-flight gate around the token refresh operation

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::Shared;
use tokio::sync::Mutex;
use tracing::debug;

use crate::RefreshError;

type RefreshFuture = Shared<Pin<Box<dyn Future<Output = Result<(), RefreshError>> + Send>>>;

/// Coalesces concurrent refresh attempts onto a single in-flight operation.
///
/// The first caller spawns the refresh as an independent task and stores a
/// shared handle to it; callers arriving while it runs await that same
/// handle and reuse its outcome. The task clears the slot itself once the
/// refresh completes, so the gate is released even if every waiter has been
/// dropped mid-flight.
pub(crate) struct RefreshGate {
    in_flight: Arc<Mutex<Option<RefreshFuture>>>,
}

impl RefreshGate {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `refresh`, or join the refresh already in flight.
    pub(crate) async fn run<F>(&self, refresh: F) -> Result<(), RefreshError>
    where
        F: Future<Output = Result<(), RefreshError>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.in_flight.lock().await;
            if let Some(existing) = slot.as_ref() {
                debug!("Joining in-flight credential refresh");
                existing.clone()
            } else {
                let gate = Arc::clone(&self.in_flight);
                let handle = tokio::spawn(async move {
                    let result = refresh.await;
                    // Release the gate before any waiter observes the outcome,
                    // so a later 401 starts a fresh refresh instead of reusing
                    // this one.
                    *gate.lock().await = None;
                    result
                });
                let fut: RefreshFuture = async move {
                    handle.await.unwrap_or(Err(RefreshError::Aborted))
                }
                .boxed()
                .shared();
                *slot = Some(fut.clone());
                fut
            }
        };

        shared.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;

    fn counting_refresh(
        counter: Arc<AtomicUsize>,
        delay: Duration,
        result: Result<(), RefreshError>,
    ) -> impl Future<Output = Result<(), RefreshError>> + Send + 'static {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            result
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let gate = Arc::new(RefreshGate::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let calls = (0..8).map(|_| {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            async move {
                gate.run(counting_refresh(
                    counter,
                    Duration::from_millis(100),
                    Ok(()),
                ))
                .await
            }
        });

        let results = join_all(calls).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_runs_each_execute() {
        let gate = RefreshGate::new();
        let counter = Arc::new(AtomicUsize::new(0));

        gate.run(counting_refresh(
            Arc::clone(&counter),
            Duration::ZERO,
            Ok(()),
        ))
        .await
        .unwrap();
        gate.run(counting_refresh(
            Arc::clone(&counter),
            Duration::ZERO,
            Ok(()),
        ))
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_is_shared_by_all_waiters() {
        let gate = Arc::new(RefreshGate::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let calls = (0..4).map(|_| {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            async move {
                gate.run(counting_refresh(
                    counter,
                    Duration::from_millis(50),
                    Err(RefreshError::Rejected(503)),
                ))
                .await
            }
        });

        let results = join_all(calls).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result, Err(RefreshError::Rejected(503)));
        }
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_wedge_the_gate() {
        let gate = Arc::new(RefreshGate::new());
        let counter = Arc::new(AtomicUsize::new(0));

        // Start a refresh and abandon the waiter immediately.
        let abandoned = {
            let gate = Arc::clone(&gate);
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                gate.run(counting_refresh(
                    counter,
                    Duration::from_millis(50),
                    Ok(()),
                ))
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        abandoned.abort();

        // The refresh task itself still completes and releases the gate.
        tokio::time::sleep(Duration::from_millis(100)).await;
        gate.run(counting_refresh(
            Arc::clone(&counter),
            Duration::ZERO,
            Ok(()),
        ))
        .await
        .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
