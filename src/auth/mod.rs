//! Access token management for the upstream APIs
//!
//! A single [`TokenManager`] is shared by every fetch. It validates the cached
//! token before each use and refreshes it through the client-credentials grant
//! when validation fails. Concurrent callers are serialized so at most one
//! refresh is in flight.

mod token;

pub use token::{AccessToken, TokenManager, TokenStore};

use thiserror::Error;

/// Errors raised while obtaining an access token
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential endpoint rejected the request with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Credential request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential response could not be decoded: {0}")]
    Decode(String),

    #[error("Gave up after {attempts} token refresh attempts, last error: {last}")]
    Exhausted { attempts: u32, last: String },
}
