pub mod types;
mod window;

pub use crate::window::{TimeWindow, TimeWindowResolver};

use crate::types::{Dimension, LoginRequest, LoginResponse, QueryResult};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

/// Lookback used when neither the caller nor the builder picks one.
pub const DEFAULT_DAYS_BACK: u32 = 30;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure, undecodable body, or a failed login.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// An authenticated request came back with a non-2xx status.
    #[error("Umami API error ({status}): {source}")]
    Api {
        status: u16,
        #[source]
        source: StatusError,
    },
}

/// A non-2xx answer, including redirects `reqwest` did not follow.
#[derive(Debug, thiserror::Error)]
#[error("HTTP status {status} for url ({url})")]
pub struct StatusError {
    pub status: StatusCode,
    pub url: String,
    /// Response body as text, empty if it could not be read.
    pub body: String,
}

impl Error {
    /// Upstream status code for [`Error::Api`], `None` otherwise.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(_) => None,
        }
    }
}

/// Login credentials. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

macro_rules! dimension_accessors {
    ($($(#[$meta:meta])* $name:ident => $dimension:ident;)+) => {
        $(
            $(#[$meta])*
            ///
            /// # Errors
            /// Same as [`UmamiApi::get_metrics_by_type`].
            async fn $name(&self, days_back: Option<u32>) -> Result<QueryResult, Error> {
                self.get_metrics_by_type(Dimension::$dimension.as_str(), days_back).await
            }
        )+
    };
}

/// Read access to one Umami website.
///
/// `UmamiClient` is the implementation talking to a real server; tests and
/// callers can substitute their own.
#[allow(async_fn_in_trait)]
pub trait UmamiApi {
    /// Retrieves page metrics. `metric_type` defaults to `"path"`.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for a non-2xx response and [`Error::Http`] if
    /// login or the transport fails.
    async fn get_page_metrics(
        &self,
        days_back: Option<u32>,
        metric_type: Option<&str>,
    ) -> Result<QueryResult, Error>;

    /// Retrieves summary statistics (pageviews, visitors, bounces, ...).
    ///
    /// # Errors
    /// Returns [`Error::Api`] for a non-2xx response and [`Error::Http`] if
    /// login or the transport fails.
    async fn get_stats(&self, days_back: Option<u32>) -> Result<QueryResult, Error>;

    /// Retrieves a breakdown by an arbitrary metric type.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for a non-2xx response and [`Error::Http`] if
    /// login or the transport fails.
    async fn get_metrics_by_type(
        &self,
        metric_type: &str,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error>;

    /// Retrieves the pageview series. `unit` defaults to `"day"` and
    /// `timezone` to `"UTC"`.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for a non-2xx response and [`Error::Http`] if
    /// login or the transport fails.
    async fn get_page_views(
        &self,
        unit: Option<&str>,
        timezone: Option<&str>,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error>;

    /// Retrieves the current number of active visitors.
    ///
    /// # Errors
    /// Returns [`Error::Api`] for a non-2xx response and [`Error::Http`] if
    /// login or the transport fails.
    async fn get_active_users(&self) -> Result<QueryResult, Error>;

    /// Forgets the cached token; the next request logs in again.
    fn clear_token(&self);

    /// Retrieves the breakdown for one of the fixed dimensions.
    ///
    /// # Errors
    /// Same as [`UmamiApi::get_metrics_by_type`].
    async fn get_dimension(
        &self,
        dimension: Dimension,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error> {
        self.get_metrics_by_type(dimension.as_str(), days_back).await
    }

    dimension_accessors! {
        /// Retrieves referrer metrics.
        get_referrers => Referrer;
        /// Retrieves browser metrics.
        get_browsers => Browser;
        /// Retrieves operating system metrics.
        get_operating_systems => Os;
        /// Retrieves device metrics.
        get_devices => Device;
        /// Retrieves country metrics.
        get_countries => Country;
        /// Retrieves event metrics.
        get_events => Event;
    }
}

pub struct UmamiClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    website_id: String,
    default_days_back: u32,
    resolver: TimeWindowResolver,
    token: Mutex<Option<String>>,
    // Held while logging in so concurrent callers share one login.
    login: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for UmamiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UmamiClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("website_id", &self.website_id)
            .field("default_days_back", &self.default_days_back)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl UmamiClient {
    /// Creates a client for `website_id` on the Umami instance at `base_url`.
    /// Trailing slashes are stripped from the URL; the lookback defaults to
    /// [`DEFAULT_DAYS_BACK`].
    #[must_use]
    pub fn new(
        base_url: impl AsRef<str>,
        credentials: Credentials,
        website_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
            credentials,
            website_id: website_id.into(),
            default_days_back: DEFAULT_DAYS_BACK,
            resolver: TimeWindowResolver::new(),
            token: Mutex::new(None),
            login: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the lookback used when an operation gets `None` for `days_back`.
    #[must_use]
    pub fn with_default_days_back(mut self, days_back: u32) -> Self {
        self.default_days_back = days_back;
        self
    }

    /// Replaces the resolver turning `days_back` into absolute timestamps.
    #[must_use]
    pub fn with_time_window_resolver(mut self, resolver: TimeWindowResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Uses a preconfigured `reqwest` client (timeouts, proxies, TLS).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn website_id(&self) -> &str {
        &self.website_id
    }

    #[must_use]
    pub const fn default_days_back(&self) -> u32 {
        self.default_days_back
    }

    /// Whether a token is currently cached.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.lock().is_some()
    }

    fn resolve(&self, days_back: Option<u32>) -> TimeWindow {
        self.resolver.resolve(days_back.unwrap_or(self.default_days_back))
    }

    fn website_endpoint(&self, resource: &str) -> String {
        format!("/api/websites/{}/{resource}", self.website_id)
    }

    /// Returns the cached token, logging in first if there is none.
    async fn authenticate(&self) -> Result<String, Error> {
        if let Some(token) = self.token.lock().clone() {
            trace!("reusing cached umami token");
            return Ok(token);
        }

        let _login = self.login.lock().await;
        if let Some(token) = self.token.lock().clone() {
            return Ok(token);
        }

        debug!(username = %self.credentials.username, "logging in to umami");
        let body = LoginRequest {
            username: &self.credentials.username,
            password: &self.credentials.password,
        };
        let response: LoginResponse = self
            .client
            .post(format!("{}/api/auth/login", self.base_url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *self.token.lock() = Some(response.token.clone());
        Ok(response.token)
    }

    async fn get<U>(&self, endpoint: &str, query: &U) -> Result<QueryResult, Error>
    where
        U: serde::ser::Serialize + ?Sized,
    {
        let token = self.authenticate().await?;
        debug!(endpoint, "GET");
        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                source: StatusError { status, url, body },
            });
        }
        response.json().await.map_err(Error::from)
    }

    async fn fetch_metrics(
        &self,
        metric_type: &str,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error> {
        let window = self.resolve(days_back);
        let query = [
            ("startAt", window.start_at.to_string()),
            ("endAt", window.end_at.to_string()),
            ("type", metric_type.to_string()),
        ];
        self.get(&self.website_endpoint("metrics"), &query).await
    }
}

impl UmamiApi for UmamiClient {
    async fn get_page_metrics(
        &self,
        days_back: Option<u32>,
        metric_type: Option<&str>,
    ) -> Result<QueryResult, Error> {
        self.fetch_metrics(metric_type.unwrap_or("path"), days_back).await
    }

    async fn get_stats(&self, days_back: Option<u32>) -> Result<QueryResult, Error> {
        let window = self.resolve(days_back);
        let query = [
            ("startAt", window.start_at.to_string()),
            ("endAt", window.end_at.to_string()),
        ];
        self.get(&self.website_endpoint("stats"), &query).await
    }

    async fn get_metrics_by_type(
        &self,
        metric_type: &str,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error> {
        self.fetch_metrics(metric_type, days_back).await
    }

    async fn get_page_views(
        &self,
        unit: Option<&str>,
        timezone: Option<&str>,
        days_back: Option<u32>,
    ) -> Result<QueryResult, Error> {
        let window = self.resolve(days_back);
        let query = [
            ("startAt", window.start_at.to_string()),
            ("endAt", window.end_at.to_string()),
            ("unit", unit.unwrap_or("day").to_string()),
            ("timezone", timezone.unwrap_or("UTC").to_string()),
        ];
        self.get(&self.website_endpoint("pageviews"), &query).await
    }

    async fn get_active_users(&self) -> Result<QueryResult, Error> {
        self.get(&self.website_endpoint("active"), &()).await
    }

    fn clear_token(&self) {
        if self.token.lock().take().is_some() {
            debug!("cleared cached umami token");
        }
    }
}
