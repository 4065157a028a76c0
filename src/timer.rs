use std::{future::Future, pin::Pin, time::Duration};

/// Future returned by [`Timer::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of the deadline and backoff sleeps used by the fetcher.
///
/// Dropping the returned future must release the underlying timer.
pub trait Timer: Send + Sync {
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// [`Timer`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
