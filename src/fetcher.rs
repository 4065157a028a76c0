use std::{convert::Infallible, fmt, future::Future, sync::Arc};

use tokio_util::sync::CancellationToken;

use crate::{
    error::BoxError,
    state::{AttemptOutcome, FetchAttempt, FetchState},
    timer::{Timer, TokioTimer},
    FetchError, FetchResult, RetryPolicy,
};

/// Runs read operations with a per-attempt deadline and retries deadline
/// failures with exponential backoff.
///
/// Any error returned by the operation itself is final: it is surfaced as
/// [`FetchError::OperationFailed`] without another attempt. Every timer the
/// fetcher creates is dropped before the returned future completes.
#[derive(Clone)]
pub struct ResilientFetcher {
    timer: Arc<dyn Timer>,
}

impl fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("timer", &"<timer>")
            .finish()
    }
}

impl Default for ResilientFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker returned when a sequence is abandoned through its token.
struct Cancelled;

impl ResilientFetcher {
    /// Creates a fetcher driven by tokio timers.
    pub fn new() -> Self {
        Self::with_timer(TokioTimer)
    }

    /// Creates a fetcher using a custom [`Timer`].
    pub fn with_timer(timer: impl Timer + 'static) -> Self {
        Self {
            timer: Arc::new(timer),
        }
    }

    /// Runs `operation` until it succeeds, fails, or every attempt times out.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use condo_http::{FetchStatus, ResilientFetcher, RetryPolicy};
    ///
    /// # async fn demo() {
    /// let fetcher = ResilientFetcher::new();
    /// let result = fetcher
    ///     .run(|| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) }, &RetryPolicy::default())
    ///     .await;
    /// assert_eq!(result.status(), FetchStatus::Success);
    /// # }
    /// ```
    pub async fn run<T, E, F, Fut>(&self, operation: F, policy: &RetryPolicy) -> FetchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
    {
        let never = std::future::pending::<Infallible>();
        match self.drive(operation, policy, never, |_| {}).await {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Runs `operation` like [`run`](Self::run), reporting every state
    /// transition to `observer`.
    ///
    /// Returns `None` once `cancel` fires. After that no observer call is
    /// made and the in-flight attempt is dropped unread.
    pub async fn run_with<T, E, F, Fut, O>(
        &self,
        operation: F,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        observer: O,
    ) -> Option<FetchResult<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        O: FnMut(&FetchState),
    {
        let cancelled = async {
            cancel.cancelled().await;
            Cancelled
        };
        self.drive(operation, policy, cancelled, observer).await.ok()
    }

    async fn drive<T, E, F, Fut, C, X, O>(
        &self,
        mut operation: F,
        policy: &RetryPolicy,
        cancel: C,
        mut observer: O,
    ) -> Result<FetchResult<T>, X>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<BoxError>,
        C: Future<Output = X>,
        O: FnMut(&FetchState),
    {
        tokio::pin!(cancel);
        let mut state = FetchState::Idle;
        let mut number = 0u32;

        loop {
            let attempt = FetchAttempt::start(number);
            advance(&mut state, FetchState::Attempting(attempt), &mut observer);

            let settled = {
                let deadline = self.timer.sleep(policy.timeout());
                tokio::select! {
                    biased;
                    signal = &mut cancel => return Err(signal),
                    result = operation() => Some(result),
                    () = deadline => None,
                }
            };

            let attempts = attempt.count();
            match settled {
                Some(Ok(data)) => {
                    advance(&mut state, FetchState::Succeeded { attempts }, &mut observer);
                    return Ok(FetchResult::Success {
                        data,
                        attempt_count: attempts,
                    });
                }
                Some(Err(err)) => {
                    advance(&mut state, FetchState::Failed { attempts }, &mut observer);
                    return Ok(FetchResult::Error {
                        error: FetchError::operation_failed(attempts, err),
                        attempt_count: attempts,
                    });
                }
                None => {
                    let retry_in = (attempts < policy.max_attempts())
                        .then(|| policy.delay_for(attempt.number));
                    advance(
                        &mut state,
                        FetchState::TimedOut {
                            attempt: attempt.settle(AttemptOutcome::Timeout),
                            retry_in,
                        },
                        &mut observer,
                    );

                    let Some(delay) = retry_in else {
                        advance(&mut state, FetchState::Exhausted { attempts }, &mut observer);
                        return Ok(FetchResult::Error {
                            error: FetchError::TimeoutExhausted {
                                attempts,
                                timeout: policy.timeout(),
                            },
                            attempt_count: attempts,
                        });
                    };

                    let backoff = self.timer.sleep(delay);
                    tokio::select! {
                        biased;
                        signal = &mut cancel => return Err(signal),
                        () = backoff => {}
                    }
                    number += 1;
                }
            }
        }
    }
}

fn advance<O: FnMut(&FetchState)>(state: &mut FetchState, next: FetchState, observer: &mut O) {
    debug_assert!(
        state.can_become(&next),
        "illegal fetch transition {state:?} -> {next:?}"
    );
    *state = next;
    observer(state);
}
