//! Outbound notifications
//!
//! The weekly reset reports its outcome through a [`Notifier`]. Success goes to
//! the general audience, failures to the operator. Delivery problems are the
//! notifier's own business; callers log them and carry on.

use crate::config::NotifyConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Audience of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    General,
    Operator,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Operator => "operator",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected the message with HTTP {0}")]
    Rejected(u16),
}

/// Sink for human-readable status messages
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: Channel, message: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, channel: Channel, message: &str) -> Result<(), NotifyError> {
        match channel {
            Channel::General => info!(channel = channel.as_str(), "{}", message),
            Channel::Operator => warn!(channel = channel.as_str(), "{}", message),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Posts notifications to chat webhooks, one URL per channel
///
/// A channel without a URL falls back to the log.
pub struct WebhookNotifier {
    client: Client,
    general: Option<String>,
    operator: Option<String>,
}

impl WebhookNotifier {
    pub fn new(client: Client, general: Option<String>, operator: Option<String>) -> Self {
        Self {
            client,
            general,
            operator,
        }
    }

    fn url_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::General => self.general.as_deref(),
            Channel::Operator => self.operator.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, channel: Channel, message: &str) -> Result<(), NotifyError> {
        let Some(url) = self.url_for(channel) else {
            return LogNotifier.notify(channel, message).await;
        };

        let response = self
            .client
            .post(url)
            .json(&WebhookMessage { content: message })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Picks the notifier matching the configuration
pub fn build_notifier(config: &NotifyConfig, client: Client) -> Arc<dyn Notifier> {
    if config.general_webhook.is_none() && config.operator_webhook.is_none() {
        return Arc::new(LogNotifier);
    }
    Arc::new(WebhookNotifier::new(
        client,
        config.general_webhook.clone(),
        config.operator_webhook.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier;
        assert!(notifier.notify(Channel::Operator, "reset failed").await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_routes_by_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/operator"))
            .and(body_json(serde_json::json!({ "content": "reset failed" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/general"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            Client::new(),
            Some(format!("{}/general", server.uri())),
            Some(format!("{}/operator", server.uri())),
        );

        notifier
            .notify(Channel::Operator, "reset failed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Client::new(), Some(server.uri()), None);
        let result = notifier.notify(Channel::General, "hello").await;

        assert!(matches!(result, Err(NotifyError::Rejected(500))));
    }
}
