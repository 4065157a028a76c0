//! View-facing binding of one read operation.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{error::BoxError, FetchResult, FetchState, ResilientFetcher, RetryPolicy};

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;
type Operation<T> = Arc<dyn Fn() -> BoxFuture<T> + Send + Sync>;

struct Active {
    generation: u64,
    token: CancellationToken,
}

/// Observable fetch state for one view.
///
/// The view reads the current [`FetchResult`] through [`snapshot`] or
/// [`subscribe`] and never sees attempt-level detail. [`refresh`] starts
/// the attempt sequence from scratch and supersedes any sequence still
/// running; a superseded or cancelled sequence never publishes again.
/// Dropping the resource cancels it.
///
/// [`snapshot`]: Resource::snapshot
/// [`subscribe`]: Resource::subscribe
/// [`refresh`]: Resource::refresh
pub struct Resource<T> {
    fetcher: ResilientFetcher,
    policy: RetryPolicy,
    operation: Operation<T>,
    state: watch::Sender<FetchResult<T>>,
    active: Mutex<Active>,
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("fetcher", &self.fetcher)
            .field("policy", &self.policy)
            .field("status", &self.state.borrow().status())
            .finish()
    }
}

impl<T> Resource<T>
where
    T: Send + Sync + 'static,
{
    /// Binds `operation` to a view. The initial state is loading with no
    /// attempt made yet.
    pub fn new<F, Fut, E>(fetcher: ResilientFetcher, policy: RetryPolicy, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let operation: Operation<T> = Arc::new(move || {
            let fut = operation();
            Box::pin(async move { fut.await.map_err(Into::into) }) as BoxFuture<T>
        });
        let (state, _) = watch::channel(FetchResult::default());
        Self {
            fetcher,
            policy,
            operation,
            state,
            active: Mutex::new(Active {
                generation: 0,
                token: CancellationToken::new(),
            }),
        }
    }

    /// Policy applied on every refresh.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read-only stream of state changes.
    pub fn subscribe(&self) -> watch::Receiver<FetchResult<T>> {
        self.state.subscribe()
    }

    /// Attempt indicator for the current state, e.g. `tentativa 2/4`.
    pub fn progress_label(&self) -> String {
        self.state.borrow().progress_label(self.policy.max_attempts())
    }

    /// Loads the data, starting a fresh attempt sequence.
    ///
    /// Resolves once this sequence settles or is superseded/cancelled.
    pub async fn refresh(&self) {
        let (generation, token) = self.begin();
        self.publish(generation, FetchResult::Loading { attempt_count: 0 });

        let outcome = self
            .fetcher
            .run_with(
                || (self.operation)(),
                &self.policy,
                &token,
                |state: &FetchState| {
                    if let FetchState::Attempting(attempt) = state {
                        self.publish(
                            generation,
                            FetchResult::Loading {
                                attempt_count: attempt.count(),
                            },
                        );
                    }
                },
            )
            .await;

        let Some(result) = outcome else {
            return;
        };

        #[cfg(feature = "tracing")]
        log_outcome(&result);

        self.publish(generation, result);
    }

    /// Manual retry action: restarts the whole sequence from attempt 0.
    pub async fn retry(&self) {
        self.refresh().await;
    }

    /// Stops the current sequence without publishing anything further.
    pub fn cancel(&self) {
        self.lock().token.cancel();
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut active = self.lock();
        active.token.cancel();
        active.generation += 1;
        active.token = CancellationToken::new();
        (active.generation, active.token.clone())
    }

    fn publish(&self, generation: u64, result: FetchResult<T>) {
        let active = self.lock();
        if active.generation != generation || active.token.is_cancelled() {
            return;
        }
        self.state.send_replace(result);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Active> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(feature = "tracing")]
fn log_outcome<T>(result: &FetchResult<T>) {
    match result.error() {
        Some(err) => tracing::warn!(
            attempts = result.attempt_count(),
            reason = ?err.reason(),
            "fetch failed: {err}"
        ),
        None => tracing::debug!(attempts = result.attempt_count(), "fetch succeeded"),
    }
}

impl<T: Clone> Resource<T> {
    /// Current state as seen by the view.
    pub fn snapshot(&self) -> FetchResult<T> {
        self.state.borrow().clone()
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        self.active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .cancel();
    }
}
