//! HTTP fetcher for upstream profile and roster data
//!
//! This module handles all outbound data requests, including:
//! - Building the HTTP client with a proper user agent string
//! - Budgeting each call through the shared rate limiter
//! - Attaching a valid bearer token
//! - Classifying responses into a [`FetchOutcome`]
//!
//! Fetch failures are never raised as errors. Callers decide what a missing or
//! malformed record means for the local copy.

use crate::auth::TokenManager;
use crate::config::{UpstreamConfig, UserAgentConfig};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::payload::{ErrorPayload, ProfilePayload, RosterPayload};
use crate::model::{EntityData, EntityKey, GroupKey, RosterMember};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Profile sections requested with every entity fetch
pub const PROFILE_FIELDS: &str = "gear,guild,mythic_plus_ranks,mythic_plus_weekly_highest_level_runs,mythic_plus_previous_weekly_highest_level_runs,mythic_plus_scores_by_season:current";

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// Upstream returned a well-formed record
    Found(T),

    /// Upstream says the record does not exist
    NotFound,

    /// The call failed for a reason that may go away (timeout, 5xx, no token)
    Transient(String),

    /// Upstream answered but the body could not be decoded
    Malformed(String),
}

impl<T> FetchOutcome<T> {
    /// Converts the found value, turning conversion failures into `Malformed`
    pub fn try_map<U, E, F>(self, f: F) -> FetchOutcome<U>
    where
        F: FnOnce(T) -> Result<U, E>,
        E: fmt::Display,
    {
        match self {
            Self::Found(value) => match f(value) {
                Ok(mapped) => FetchOutcome::Found(mapped),
                Err(e) => FetchOutcome::Malformed(e.to_string()),
            },
            Self::NotFound => FetchOutcome::NotFound,
            Self::Transient(reason) => FetchOutcome::Transient(reason),
            Self::Malformed(reason) => FetchOutcome::Malformed(reason),
        }
    }

    /// Splits the outcome into the found value or the reason there is none
    pub fn into_result(self) -> Result<T, FetchFailure> {
        match self {
            Self::Found(value) => Ok(value),
            Self::NotFound => Err(FetchFailure::NotFound),
            Self::Transient(reason) => Err(FetchFailure::Transient(reason)),
            Self::Malformed(reason) => Err(FetchFailure::Malformed(reason)),
        }
    }
}

/// A fetch that produced no usable record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    NotFound,
    Transient(String),
    Malformed(String),
}

impl FetchFailure {
    /// Whether this failure counts towards staleness deletion
    ///
    /// Transient failures never do; a timeout says nothing about the record.
    pub fn counts_as_missing(&self) -> bool {
        matches!(self, Self::NotFound | Self::Malformed(_))
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found upstream"),
            Self::Transient(reason) => write!(f, "transient: {}", reason),
            Self::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `upstream` - Timeouts for upstream calls
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    upstream: &UpstreamConfig,
) -> Result<Client, reqwest::Error> {
    // Format: BotName/Version (+ContactURL; ContactEmail)
    let agent = format!(
        "{}/{} (+{}; {})",
        user_agent.bot_name, user_agent.bot_version, user_agent.contact_url, user_agent.contact_email
    );

    Client::builder()
        .user_agent(agent)
        .timeout(Duration::from_secs(upstream.timeout_secs))
        .connect_timeout(Duration::from_secs(upstream.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Builds the profile request URL for an entity
pub fn profile_request_url(base: &str, key: &EntityKey) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        &format!("{}/characters/profile", base.trim_end_matches('/')),
        &[
            ("region", key.region.as_str()),
            ("realm", key.realm.as_str()),
            ("name", key.name.as_str()),
            ("fields", PROFILE_FIELDS),
        ],
    )
}

/// Builds the roster request URL for a group
///
/// `{region}` in the base is replaced with the group's region.
pub fn roster_request_url(base: &str, locale: &str, group: &GroupKey) -> Result<Url, String> {
    let base = base.replace("{region}", &group.region);
    let mut url = Url::parse(&base).map_err(|e| format!("invalid roster url '{}': {}", base, e))?;

    url.path_segments_mut()
        .map_err(|_| format!("roster url '{}' cannot be a base", base))?
        .pop_if_empty()
        .extend(["data", "wow", "guild", group.realm.as_str(), group.name.as_str(), "roster"]);

    url.query_pairs_mut()
        .clear()
        .append_pair("namespace", &format!("profile-{}", group.region))
        .append_pair("locale", locale);

    Ok(url)
}

/// Fetches entities and rosters from upstream
pub struct Fetcher {
    client: Client,
    tokens: Arc<TokenManager>,
    limiter: Arc<RateLimiter>,
    upstream: UpstreamConfig,
    min_level: u32,
    max_level: u32,
}

impl Fetcher {
    pub fn new(
        client: Client,
        tokens: Arc<TokenManager>,
        limiter: Arc<RateLimiter>,
        upstream: UpstreamConfig,
        min_level: u32,
        max_level: u32,
    ) -> Self {
        Self {
            client,
            tokens,
            limiter,
            upstream,
            min_level,
            max_level,
        }
    }

    /// Fetches the profile of one entity
    pub async fn fetch_entity(&self, key: &EntityKey) -> FetchOutcome<EntityData> {
        let url = match profile_request_url(&self.upstream.profile_url, key) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Transient(format!("invalid profile url: {}", e)),
        };

        debug!("Fetching profile for {}", key);
        self.get_json::<ProfilePayload>(url)
            .await
            .try_map(EntityData::try_from)
    }

    /// Fetches the eligible members of a group
    pub async fn fetch_roster(&self, group: &GroupKey) -> FetchOutcome<Vec<RosterMember>> {
        let url = match roster_request_url(&self.upstream.roster_url, &self.upstream.locale, group)
        {
            Ok(url) => url,
            Err(e) => return FetchOutcome::Transient(e),
        };

        debug!("Fetching roster for {}", group);
        let (min, max) = (self.min_level, self.max_level);
        self.get_json::<RosterPayload>(url)
            .await
            .try_map(|payload| Ok::<_, String>(payload.into_members(min, max)))
    }

    /// Performs one budgeted, authorized GET and decodes the JSON body
    ///
    /// # Classification
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | 2xx, body decodes | Found |
    /// | 2xx, body does not decode | Malformed |
    /// | 404 | NotFound |
    /// | 400 whose message reports a missing record | NotFound |
    /// | Other non-2xx | Transient |
    /// | Timeout, connection error | Transient |
    /// | No valid token | Transient |
    async fn get_json<P: DeserializeOwned>(&self, url: Url) -> FetchOutcome<P> {
        // Token first: a refresh in backoff must not hold an in-flight slot
        let token = match self.tokens.get_valid_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("No access token available: {}", e);
                return FetchOutcome::Transient(format!("token unavailable: {}", e));
            }
        };

        let _permit = self.limiter.acquire().await;

        let response = match self
            .client
            .get(url.clone())
            .bearer_auth(token.secret())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Transient(describe_request_error(&e)),
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Transient(describe_request_error(&e)),
        };

        if status.is_success() {
            return match serde_json::from_slice::<P>(&body) {
                Ok(payload) => FetchOutcome::Found(payload),
                Err(e) => {
                    warn!("Undecodable body from {}: {}", url.path(), e);
                    FetchOutcome::Malformed(e.to_string())
                }
            };
        }

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        classify_failure(status, &body)
    }
}

/// Maps a non-2xx response to an outcome
fn classify_failure<T>(status: StatusCode, body: &[u8]) -> FetchOutcome<T> {
    if status == StatusCode::NOT_FOUND {
        return FetchOutcome::NotFound;
    }

    if status == StatusCode::BAD_REQUEST {
        let reports_missing = serde_json::from_slice::<ErrorPayload>(body)
            .map(|e| e.reports_not_found())
            .unwrap_or(false);
        if reports_missing {
            return FetchOutcome::NotFound;
        }
    }

    FetchOutcome::Transient(format!("HTTP {}", status.as_u16()))
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.to_string()
    }
}
