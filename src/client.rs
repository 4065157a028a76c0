use std::fmt;

use reqwest::{header, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    ApiError, Announcement, DashboardStats, FetchResult, MaintenanceTicket, NewMaintenanceTicket,
    NewOccurrence, Occurrence, Resource, ResilientFetcher, Result, RetryPolicy, TicketStatus,
};

const MAINTENANCE: &str = "maintenance";
const OCCURRENCES: &str = "occurrences";
const ANNOUNCEMENTS: &str = "announcements";
const DASHBOARD: &str = "dashboard";

#[derive(Clone)]
/// HTTP client for the condominium-management REST API.
///
/// Reads go through a [`ResilientFetcher`]: each attempt has a deadline
/// and only deadline failures are retried. Writes are sent once.
pub struct CondoClient {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    fetcher: ResilientFetcher,
    policy: RetryPolicy,
}

impl fmt::Debug for CondoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CondoClient")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl CondoClient {
    /// Creates a client for the API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            authorization: None,
            fetcher: ResilientFetcher::new(),
            policy: RetryPolicy::default(),
        }
    }

    /// Sends `value` unchanged as the `Authorization` header.
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Sends `token` as a bearer credential, adding the `Bearer ` prefix
    /// when it is missing.
    pub fn with_bearer(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.with_authorization(authorization)
    }

    /// Applies the deadline and retry policy used for reads.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the fetcher, e.g. to inject a custom [`Timer`](crate::Timer).
    pub fn with_fetcher(mut self, fetcher: ResilientFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `CONDO_API_URL`: API root (required)
    /// - `CONDO_API_TOKEN`: access token, Bearer prefix optional
    /// - `CONDO_FETCH_*`: read policy, see [`RetryPolicy::from_env`]
    ///
    /// # Example
    ///
    /// ```no_run
    /// use condo_http::CondoClient;
    ///
    /// let api = CondoClient::from_env().expect("missing CONDO_API_URL");
    /// ```
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("CONDO_API_URL").map_err(|_| {
            ApiError::Config("missing CONDO_API_URL environment variable".to_owned())
        })?;
        if url.trim().is_empty() {
            return Err(ApiError::Config("CONDO_API_URL is set but empty".to_owned()));
        }
        let policy = RetryPolicy::from_env()?;
        let client = Self::new(url).with_policy(policy);
        match std::env::var("CONDO_API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(client.with_bearer(token)),
            _ => Ok(client),
        }
    }

    /// API root without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Policy applied to every read.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Lists the maintenance tickets of a condominium.
    pub async fn maintenance_tickets(&self, condo_id: &str) -> FetchResult<Vec<MaintenanceTicket>> {
        self.fetch_collection(condo_id, MAINTENANCE).await
    }

    /// Lists the occurrences reported in a condominium.
    pub async fn occurrences(&self, condo_id: &str) -> FetchResult<Vec<Occurrence>> {
        self.fetch_collection(condo_id, OCCURRENCES).await
    }

    /// Lists the announcements published to a condominium.
    pub async fn announcements(&self, condo_id: &str) -> FetchResult<Vec<Announcement>> {
        self.fetch_collection(condo_id, ANNOUNCEMENTS).await
    }

    /// Loads the dashboard counters of a condominium.
    pub async fn dashboard_stats(&self, condo_id: &str) -> FetchResult<DashboardStats> {
        self.fetch_collection(condo_id, DASHBOARD).await
    }

    /// Reads `path` through the fetcher.
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str) -> FetchResult<T> {
        self.fetcher
            .run(|| self.get_json::<T>(path), &self.policy)
            .await
    }

    /// Sends a single GET for `path`, without deadline or retry.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    /// Binds `path` to a [`Resource`] for a view.
    pub fn resource<T>(&self, path: impl Into<String>) -> Resource<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let client = self.clone();
        let path: String = path.into();
        Resource::new(self.fetcher.clone(), self.policy, move || {
            let client = client.clone();
            let path = path.clone();
            async move { client.get_json::<T>(&path).await }
        })
    }

    /// Maintenance ticket list bound to a [`Resource`].
    pub fn tickets_resource(&self, condo_id: &str) -> Result<Resource<Vec<MaintenanceTicket>>> {
        Ok(self.resource(collection_path(condo_id, MAINTENANCE)?))
    }

    /// Opens a maintenance ticket. Sent once, never retried.
    pub async fn create_maintenance_ticket(
        &self,
        condo_id: &str,
        ticket: &NewMaintenanceTicket,
    ) -> Result<MaintenanceTicket> {
        let path = collection_path(condo_id, MAINTENANCE)?;
        self.send_json(Method::POST, &path, ticket).await
    }

    /// Moves a ticket to `status`. Sent once, never retried.
    pub async fn update_ticket_status(
        &self,
        condo_id: &str,
        ticket_id: &str,
        status: TicketStatus,
    ) -> Result<MaintenanceTicket> {
        #[derive(Serialize)]
        struct StatusUpdate {
            status: TicketStatus,
        }

        let path = format!(
            "{}/{}",
            collection_path(condo_id, MAINTENANCE)?,
            path_segment("ticket id", ticket_id)?
        );
        self.send_json(Method::PATCH, &path, &StatusUpdate { status })
            .await
    }

    /// Reports an occurrence. Sent once, never retried.
    pub async fn create_occurrence(
        &self,
        condo_id: &str,
        occurrence: &NewOccurrence,
    ) -> Result<Occurrence> {
        let path = collection_path(condo_id, OCCURRENCES)?;
        self.send_json(Method::POST, &path, occurrence).await
    }

    async fn fetch_collection<T: DeserializeOwned>(
        &self,
        condo_id: &str,
        collection: &str,
    ) -> FetchResult<T> {
        self.fetcher
            .run(
                || self.get_collection::<T>(condo_id, collection),
                &self.policy,
            )
            .await
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        condo_id: &str,
        collection: &str,
    ) -> Result<T> {
        let path = collection_path(condo_id, collection)?;
        self.get_json(&path).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(method, path).json(body)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        match &self.authorization {
            Some(value) => request.header(header::AUTHORIZATION, value),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = request.build().map_err(ApiError::Transport)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");

        let response = self
            .http
            .execute(request)
            .await
            .map_err(ApiError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::Transport)?;

        if !status.is_success() {
            #[cfg(feature = "tracing")]
            tracing::debug!(status = status.as_u16(), "request rejected");

            return Err(ApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<T>(&body).map_err(|err| {
            ApiError::Decode(format!("invalid response JSON: {err}; body: {body}"))
        })
    }
}

fn collection_path(condo_id: &str, collection: &str) -> Result<String> {
    Ok(format!(
        "condominiums/{}/{collection}",
        path_segment("condominium id", condo_id)?
    ))
}

fn path_segment<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidArgument(format!("{what} is empty")));
    }
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'))
    {
        return Err(ApiError::InvalidArgument(format!(
            "{what} {trimmed:?} is not a valid path segment"
        )));
    }
    Ok(trimmed)
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
