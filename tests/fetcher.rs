use std::{
    future::pending,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use condo_http::{
    FailureReason, FetchError, FetchState, FetchStatus, ResilientFetcher, RetryPolicy, Sleep,
    Timer,
};
use serde_json::{json, Value as JsonValue};
use tokio_util::sync::CancellationToken;

/// Timer that records requested durations and counts sleeps still alive.
#[derive(Clone, Default)]
struct TrackingTimer {
    live: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<Duration>>>,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Timer for TrackingTimer {
    fn sleep(&self, duration: Duration) -> Sleep {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .expect("timer log mutex must not be poisoned")
            .push(duration);
        let guard = LiveGuard(Arc::clone(&self.live));
        Box::pin(async move {
            let _guard = guard;
            tokio::time::sleep(duration).await;
        })
    }
}

impl TrackingTimer {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn requested(&self) -> Vec<Duration> {
        self.requested
            .lock()
            .expect("timer log mutex must not be poisoned")
            .clone()
    }

    fn requested_ms(&self) -> Vec<u128> {
        self.requested
            .lock()
            .expect("timer log mutex must not be poisoned")
            .iter()
            .map(Duration::as_millis)
            .collect()
    }
}

fn policy(max_attempts: u32, timeout_ms: u64, base_ms: u64, max_ms: u64) -> RetryPolicy {
    RetryPolicy::from_millis(max_attempts, timeout_ms, base_ms, max_ms).expect("valid policy")
}

#[tokio::test(start_paused = true)]
async fn always_slow_operation_is_exhausted_after_max_attempts() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let calls = AtomicU32::new(0);
    let started = tokio::time::Instant::now();

    let result = fetcher
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok::<_, String>(())
                }
            },
            &policy(3, 100, 50, 200),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.status(), FetchStatus::Error);
    assert_eq!(result.reason(), Some(FailureReason::Exhausted));
    assert_eq!(result.attempt_count(), 3);
    assert!(matches!(
        result.error(),
        Some(FetchError::TimeoutExhausted { attempts: 3, timeout })
            if *timeout == Duration::from_millis(100)
    ));
    // deadline, backoff, deadline, backoff, deadline
    assert_eq!(timer.requested_ms(), vec![100, 50, 100, 100, 100]);
    assert_eq!(timer.live(), 0);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(450), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn success_on_attempt_k_uses_exactly_k_calls() {
    for k in 1..=4u32 {
        let timer = TrackingTimer::default();
        let fetcher = ResilientFetcher::with_timer(timer.clone());
        let calls = AtomicU32::new(0);

        let result = fetcher
            .run(
                || {
                    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if call < k {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok::<_, String>(call)
                    }
                },
                &policy(4, 100, 10, 40),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), k, "k = {k}");
        assert_eq!(result.status(), FetchStatus::Success, "k = {k}");
        assert_eq!(result.data(), Some(&k));
        assert_eq!(result.attempt_count(), k);
        assert_eq!(timer.live(), 0, "k = {k}");
    }
}

#[tokio::test(start_paused = true)]
async fn non_timeout_error_is_never_retried() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let calls = AtomicU32::new(0);

    let result = fetcher
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(std::io::Error::other("connection reset")) }
            },
            &policy(5, 100, 10, 40),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.reason(), Some(FailureReason::OperationError));
    assert_eq!(result.attempt_count(), 1);
    let source = result
        .error()
        .and_then(FetchError::operation_error)
        .expect("operation error must be preserved");
    assert!(source.downcast_ref::<std::io::Error>().is_some());
    assert_eq!(timer.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_and_caps() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let retry = policy(5, 20, 10, 50);

    let result = fetcher.run(|| pending::<Result<(), String>>(), &retry).await;

    assert_eq!(result.attempt_count(), 5);
    let backoffs: Vec<u128> = timer
        .requested_ms()
        .into_iter()
        .skip(1)
        .step_by(2)
        .collect();
    assert_eq!(backoffs, vec![10, 20, 40, 50]);
    for n in 0..4 {
        assert_eq!(backoffs[n as usize], retry.delay_for(n).as_millis());
    }
    assert_eq!(timer.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn sub_millisecond_policy_is_honoured_exactly() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let retry = RetryPolicy::new(
        3,
        Duration::from_micros(800),
        Duration::from_micros(500),
        Duration::from_micros(900),
    )
    .expect("valid policy");

    let result = fetcher.run(|| pending::<Result<(), String>>(), &retry).await;

    assert_eq!(result.attempt_count(), 3);
    assert_eq!(
        timer.requested(),
        [800, 500, 800, 900, 800].map(Duration::from_micros).to_vec()
    );
    assert!(matches!(
        result.error(),
        Some(FetchError::TimeoutExhausted { timeout, .. })
            if *timeout == Duration::from_micros(800)
    ));
    assert_eq!(timer.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn quick_payload_is_returned_on_first_attempt() {
    let result = ResilientFetcher::new()
        .run(
            || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, String>(json!({"items": [1, 2, 3]}))
            },
            &RetryPolicy::default(),
        )
        .await;

    assert_eq!(result.status(), FetchStatus::Success);
    assert_eq!(result.data(), Some(&json!({"items": [1, 2, 3]})));
    assert_eq!(result.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn http_404_surfaces_without_retry() {
    let calls = AtomicU32::new(0);
    let result = ResilientFetcher::new()
        .run(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<JsonValue, _>("HTTP 404") }
            },
            &RetryPolicy::default(),
        )
        .await;

    assert_eq!(result.status(), FetchStatus::Error);
    assert!(result
        .error_message()
        .is_some_and(|message| message.contains("404")));
    assert_eq!(result.attempt_count(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn one_timeout_then_success_reports_each_transition() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let calls = AtomicU32::new(0);
    let mut states = Vec::new();
    let cancel = CancellationToken::new();

    let result = fetcher
        .run_with(
            || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let delay = if call == 0 { 500 } else { 10 };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok::<_, String>("tickets")
                }
            },
            &policy(4, 100, 50, 200),
            &cancel,
            |state: &FetchState| states.push(*state),
        )
        .await
        .expect("sequence was not cancelled");

    assert_eq!(result.status(), FetchStatus::Success);
    assert_eq!(result.attempt_count(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(states.len(), 4);
    assert!(matches!(states[0], FetchState::Attempting(a) if a.number == 0));
    assert!(matches!(
        states[1],
        FetchState::TimedOut { attempt, retry_in: Some(delay) }
            if attempt.number == 0 && delay == Duration::from_millis(50)
    ));
    assert!(matches!(states[2], FetchState::Attempting(a) if a.number == 1));
    assert_eq!(states[3], FetchState::Succeeded { attempts: 2 });
    for pair in states.windows(2) {
        assert!(pair[0].can_become(&pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
    assert_eq!(timer.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_attempt_discards_late_result() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let calls = Arc::new(AtomicU32::new(0));
    let settled = Arc::new(AtomicU32::new(0));
    let transitions = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();

    let task = {
        let calls = Arc::clone(&calls);
        let settled = Arc::clone(&settled);
        let transitions = Arc::clone(&transitions);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            fetcher
                .run_with(
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let settled = Arc::clone(&settled);
                        async move {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            settled.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, String>(1u8)
                        }
                    },
                    &policy(4, 1_000, 50, 200),
                    &cancel,
                    |_: &FetchState| {
                        transitions.fetch_add(1, Ordering::SeqCst);
                    },
                )
                .await
        })
    };

    while calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen_before_cancel = transitions.load(Ordering::SeqCst);
    cancel.cancel();

    let outcome = task.await.expect("fetch task must not panic");
    assert!(outcome.is_none());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(settled.load(Ordering::SeqCst), 0);
    assert_eq!(transitions.load(Ordering::SeqCst), seen_before_cancel);
    assert_eq!(timer.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_clears_timer() {
    let timer = TrackingTimer::default();
    let fetcher = ResilientFetcher::with_timer(timer.clone());
    let cancel = CancellationToken::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            fetcher
                .run_with(
                    || pending::<Result<(), String>>(),
                    &policy(4, 100, 1_000, 5_000),
                    &cancel,
                    |_: &FetchState| {},
                )
                .await
        })
    };

    // first deadline at 100ms, backoff runs until 1100ms
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(timer.requested_ms(), vec![100, 1_000]);
    assert_eq!(timer.live(), 1);

    cancel.cancel();
    assert!(task.await.expect("fetch task must not panic").is_none());
    assert_eq!(timer.live(), 0);
}
