//! Scatter work across independent tasks and gather every outcome
//!
//! Each key gets its own spawned task with its own deadline, so one slow or
//! panicking worker never delays or voids the others. Results come back in
//! input order, one per key.

use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum GatherError<E> {
    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(E),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ScatterConfig {
    /// Per-worker deadline, measured from when the worker starts running.
    pub deadline: Duration,
    /// Upper bound on workers running at once. `None` runs every key concurrently.
    pub max_concurrency: Option<usize>,
}

impl ScatterConfig {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            max_concurrency: None,
        }
    }
}

/// Run `work` once per key and collect all outcomes in input order.
///
/// Workers that exceed the deadline are dropped and reported as
/// [`GatherError::TimedOut`]. There is no cancel-on-first-failure.
pub async fn scatter_gather<K, T, E, F, Fut>(
    keys: Vec<K>,
    config: ScatterConfig,
    work: F,
) -> Vec<(K, Result<T, GatherError<E>>)>
where
    K: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(&K) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let permits = config
        .max_concurrency
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
    let deadline = config.deadline;

    let workers: Vec<_> = keys
        .into_iter()
        .map(|key| {
            let job = work(&key);
            let permits = permits.clone();

            let handle = tokio::spawn(async move {
                let _permit = match permits {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                tokio::time::timeout(deadline, job).await
            });

            async move {
                let outcome = match handle.await {
                    Ok(Ok(Ok(value))) => Ok(value),
                    Ok(Ok(Err(e))) => Err(GatherError::Failed(e)),
                    Ok(Err(_)) => Err(GatherError::TimedOut(deadline)),
                    Err(e) => Err(GatherError::Panicked(panic_message(e))),
                };
                (key, outcome)
            }
        })
        .collect();

    join_all(workers).await
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task cancelled".to_string();
    }

    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
