use std::{sync::Arc, time::Duration};

use crate::result::FailureReason;

/// Boxed error produced by a fetch operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Terminal failure of a resilient fetch.
#[derive(Clone, Debug, thiserror::Error)]
pub enum FetchError {
    /// Every attempt exceeded its deadline.
    #[error("server did not respond within {timeout:?} after {attempts} attempts")]
    TimeoutExhausted { attempts: u32, timeout: Duration },
    /// The operation failed with a non-timeout error and was not retried.
    #[error("request failed on attempt {attempt}: {source}")]
    OperationFailed {
        /// 1-based attempt on which the operation failed.
        attempt: u32,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    pub(crate) fn operation_failed(attempt: u32, source: impl Into<BoxError>) -> Self {
        Self::OperationFailed {
            attempt,
            source: Arc::from(source.into()),
        }
    }

    /// Classifies the failure for the view.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::TimeoutExhausted { .. } => FailureReason::Exhausted,
            Self::OperationFailed { .. } => FailureReason::OperationError,
        }
    }

    /// Returns the wrapped operation error when there is one.
    pub fn operation_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::OperationFailed { source, .. } => Some(source.as_ref()),
            Self::TimeoutExhausted { .. } => None,
        }
    }
}

/// Invalid retry policy configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("retry policy field `{field}` must be positive")]
    NotPositive { field: &'static str },
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Error type returned by [`CondoClient`](crate::CondoClient).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Response body did not match the expected payload.
    #[error("decode error: {0}")]
    Decode(String),
    /// Caller supplied an unusable identifier or URL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Client configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        Self::Config(err.to_string())
    }
}
