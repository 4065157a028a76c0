use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a single attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttemptOutcome {
    Pending,
    Success,
    Timeout,
    Error,
}

/// One in-flight or settled call of the operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FetchAttempt {
    /// 0-based ordinal of this attempt.
    pub number: u32,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

impl FetchAttempt {
    pub(crate) fn start(number: u32) -> Self {
        Self {
            number,
            started_at: Instant::now(),
            outcome: AttemptOutcome::Pending,
        }
    }

    pub(crate) fn settle(self, outcome: AttemptOutcome) -> Self {
        debug_assert_eq!(self.outcome, AttemptOutcome::Pending);
        Self { outcome, ..self }
    }

    /// Attempts consumed once this one has been dispatched.
    pub fn count(&self) -> u32 {
        self.number + 1
    }
}

/// Progress of one attempt sequence.
///
/// ```text
/// Idle -> Attempting -> Succeeded | Failed | TimedOut
/// TimedOut -> Attempting | Exhausted
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchState {
    Idle,
    Attempting(FetchAttempt),
    /// The attempt hit its deadline. `retry_in` is the backoff before the
    /// next attempt, `None` when no attempts remain.
    TimedOut {
        attempt: FetchAttempt,
        retry_in: Option<Duration>,
    },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
    Exhausted { attempts: u32 },
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Exhausted { .. }
        )
    }

    /// Number of attempts dispatched so far.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Attempting(attempt) | Self::TimedOut { attempt, .. } => attempt.count(),
            Self::Succeeded { attempts }
            | Self::Failed { attempts }
            | Self::Exhausted { attempts } => *attempts,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_become(&self, next: &FetchState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Attempting(attempt)) => attempt.number == 0,
            (Self::Attempting(current), Self::Succeeded { attempts })
            | (Self::Attempting(current), Self::Failed { attempts }) => {
                *attempts == current.count()
            }
            (Self::Attempting(current), Self::TimedOut { attempt, .. }) => {
                attempt.number == current.number
            }
            (
                Self::TimedOut {
                    attempt,
                    retry_in: Some(_),
                },
                Self::Attempting(next),
            ) => next.number == attempt.number + 1,
            (
                Self::TimedOut {
                    attempt,
                    retry_in: None,
                },
                Self::Exhausted { attempts },
            ) => *attempts == attempt.count(),
            _ => false,
        }
    }
}
