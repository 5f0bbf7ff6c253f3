use crate::auth::AuthError;
use crate::config::AuthConfig;
use crate::storage::{lock_storage, Storage, StorageResult, ACCESS_TOKEN_SETTING};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// An opaque bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token, for the Authorization header
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Where the current token survives restarts
pub trait TokenStore: Send + Sync {
    fn load_token(&self) -> StorageResult<Option<String>>;

    fn save_token(&self, token: &str) -> StorageResult<()>;
}

impl<S: Storage + Send> TokenStore for Mutex<S> {
    fn load_token(&self) -> StorageResult<Option<String>> {
        lock_storage(self)?.get_setting(ACCESS_TOKEN_SETTING)
    }

    fn save_token(&self, token: &str) -> StorageResult<()> {
        lock_storage(self)?.put_setting(ACCESS_TOKEN_SETTING, token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// The in-memory token and when upstream last accepted it
struct CachedToken {
    token: AccessToken,
    checked_at: Option<Instant>,
}

impl CachedToken {
    fn recently_checked(&self, ttl: Duration) -> bool {
        self.checked_at.map_or(false, |at| at.elapsed() < ttl)
    }
}

/// Validates and refreshes the shared access token
pub struct TokenManager {
    client: Client,
    config: AuthConfig,
    store: Arc<dyn TokenStore>,
    current: AsyncMutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(client: Client, config: AuthConfig, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            config,
            store,
            current: AsyncMutex::new(None),
        }
    }

    /// Returns a token the upstream currently accepts
    ///
    /// # Flow
    ///
    /// 1. Take the refresh lock; concurrent callers wait here
    /// 2. Load the cached token (memory first, then the store)
    /// 3. Skip validation if upstream accepted it within `validate-ttl-secs`
    /// 4. Validate it; HTTP 200 means it is returned unchanged
    /// 5. Otherwise request a new one, retrying with backoff
    /// 6. Persist the new token, then return it
    pub async fn get_valid_token(&self) -> Result<AccessToken, AuthError> {
        let mut current = self.current.lock().await;

        if current.is_none() {
            match self.store.load_token() {
                Ok(Some(stored)) => {
                    *current = Some(CachedToken {
                        token: AccessToken::new(stored),
                        checked_at: None,
                    })
                }
                Ok(None) => debug!("No stored access token"),
                Err(e) => warn!("Failed to load stored access token: {}", e),
            }
        }

        let ttl = Duration::from_secs(self.config.validate_ttl_secs);
        if let Some(cached) = current.as_mut() {
            if cached.recently_checked(ttl) {
                return Ok(cached.token.clone());
            }
            match self.validate(&cached.token).await {
                Ok(true) => {
                    cached.checked_at = Some(Instant::now());
                    return Ok(cached.token.clone());
                }
                Ok(false) => info!("Access token no longer valid, refreshing"),
                Err(e) => warn!("Access token validation failed: {}", e),
            }
        }

        let token = self.refresh_with_retry().await?;

        if let Err(e) = self.store.save_token(token.secret()) {
            error!("Failed to persist refreshed access token: {}", e);
        }

        *current = Some(CachedToken {
            token: token.clone(),
            checked_at: Some(Instant::now()),
        });
        Ok(token)
    }

    /// Forces validation on the next call, e.g. after upstream answered 401
    pub async fn invalidate(&self) {
        if let Some(cached) = self.current.lock().await.as_mut() {
            cached.checked_at = None;
        }
    }

    async fn validate(&self, token: &AccessToken) -> Result<bool, reqwest::Error> {
        let response = self
            .client
            .get(&self.config.validate_url)
            .bearer_auth(token.secret())
            .send()
            .await?;

        Ok(response.status() == StatusCode::OK)
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Decode(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(AuthError::Decode("empty access_token".to_string()));
        }

        Ok(AccessToken::new(body.access_token))
    }

    async fn refresh_with_retry(&self) -> Result<AccessToken, AuthError> {
        let backoff = Duration::from_secs(self.config.retry_backoff_secs);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.request_token().await {
                Ok(token) => {
                    info!(attempts, "Obtained new access token");
                    return Ok(token);
                }
                Err(e) => {
                    if self.config.max_attempts != 0 && attempts >= self.config.max_attempts {
                        error!(attempts, "Token refresh exhausted: {}", e);
                        return Err(AuthError::Exhausted {
                            attempts,
                            last: e.to_string(),
                        });
                    }
                    warn!(attempts, "Token refresh failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
