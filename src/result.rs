use serde::{Serialize, Serializer};

use crate::FetchError;

/// Label of the manual retry action shown next to an error panel.
pub const RETRY_ACTION_LABEL: &str = "Tentar Novamente";

/// Coarse status consumed by rendering code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Loading,
    Success,
    Error,
}

/// Why a fetch ended in [`FetchStatus::Error`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt hit its deadline.
    Exhausted,
    /// The operation failed with a non-timeout error.
    OperationError,
}

/// Tri-state result exposed to a view.
///
/// `attempt_count` never exceeds the policy's `max_attempts`.
#[derive(Clone, Debug)]
pub enum FetchResult<T> {
    Loading { attempt_count: u32 },
    Success { data: T, attempt_count: u32 },
    Error { error: FetchError, attempt_count: u32 },
}

impl<T> FetchResult<T> {
    /// Coarse status of this result.
    pub fn status(&self) -> FetchStatus {
        match self {
            Self::Loading { .. } => FetchStatus::Loading,
            Self::Success { .. } => FetchStatus::Success,
            Self::Error { .. } => FetchStatus::Error,
        }
    }

    /// Attempts started so far, or in total once settled.
    pub fn attempt_count(&self) -> u32 {
        match self {
            Self::Loading { attempt_count }
            | Self::Success { attempt_count, .. }
            | Self::Error { attempt_count, .. } => *attempt_count,
        }
    }

    /// True while no terminal result is known.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Loaded payload, only on success.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Consumes the result, keeping only the payload.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Terminal error, only on failure.
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// User-facing text of the error.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// Why the fetch failed.
    pub fn reason(&self) -> Option<FailureReason> {
        self.error().map(FetchError::reason)
    }

    /// Attempt indicator such as `tentativa 3/4`.
    pub fn progress_label(&self, max_attempts: u32) -> String {
        format!("tentativa {}/{}", self.attempt_count(), max_attempts)
    }

    /// Transforms the payload, keeping status and attempt count.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        match self {
            Self::Loading { attempt_count } => FetchResult::Loading { attempt_count },
            Self::Success {
                data,
                attempt_count,
            } => FetchResult::Success {
                data: f(data),
                attempt_count,
            },
            Self::Error {
                error,
                attempt_count,
            } => FetchResult::Error {
                error,
                attempt_count,
            },
        }
    }

    /// `None` while loading, otherwise the settled outcome.
    pub fn into_result(self) -> Option<Result<T, FetchError>> {
        match self {
            Self::Loading { .. } => None,
            Self::Success { data, .. } => Some(Ok(data)),
            Self::Error { error, .. } => Some(Err(error)),
        }
    }
}

impl<T> Default for FetchResult<T> {
    fn default() -> Self {
        Self::Loading { attempt_count: 0 }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchResultView<'a, T> {
    status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<FailureReason>,
    attempt_count: u32,
}

impl<T: Serialize> Serialize for FetchResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FetchResultView {
            status: self.status(),
            data: self.data(),
            error_message: self.error_message(),
            reason: self.reason(),
            attempt_count: self.attempt_count(),
        }
        .serialize(serializer)
    }
}
