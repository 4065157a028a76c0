//! `condo-http` is the data layer of a condominium-management application.
//!
//! Reads run through [`ResilientFetcher`], which gives every attempt a
//! deadline, retries only deadline failures with capped exponential backoff,
//! and reports a tri-state [`FetchResult`] (loading / success / error):
//! - [`ResilientFetcher::run`] for one-shot reads
//! - [`Resource`] for views that render loading, content, or an error panel
//!   with a manual retry
//! - [`CondoClient`] for the REST endpoints (tickets, occurrences,
//!   announcements, dashboard)

mod client;
mod error;
mod fetcher;
pub mod filter;
mod policy;
mod resource;
mod result;
mod state;
mod timer;
mod types;

pub use client::CondoClient;
pub use error::{ApiError, BoxError, FetchError, PolicyError};
pub use fetcher::ResilientFetcher;
pub use filter::{OccurrenceFilter, Searchable, TicketFilter};
pub use policy::RetryPolicy;
pub use resource::Resource;
pub use result::{FailureReason, FetchResult, FetchStatus, RETRY_ACTION_LABEL};
pub use state::{AttemptOutcome, FetchAttempt, FetchState};
pub use timer::{Sleep, Timer, TokioTimer};
pub use types::{
    Announcement, DashboardStats, MaintenanceTicket, NewMaintenanceTicket, NewOccurrence,
    Occurrence, OccurrenceStatus, Priority, TicketStatus,
};

pub type Result<T> = std::result::Result<T, ApiError>;
