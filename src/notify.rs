// src/notify.rs

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

/// Failure to deliver a badge notification. Never surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint returned {0}")]
    Rejected(reqwest::StatusCode),

    #[error("{0}")]
    Other(String),
}

/// Payload describing a freshly earned badge.
#[derive(Debug, Clone)]
pub struct BadgeEarned {
    pub student_email: String,
    pub student_name: String,
    pub badge_name: String,
    pub badge_description: String,
}

/// Delivers "you earned a badge" messages to students.
#[async_trait]
pub trait BadgeNotifier: Send + Sync {
    async fn notify_badge_earned(&self, event: &BadgeEarned) -> Result<(), NotifyError>;
}

/// Writes the notification to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl BadgeNotifier for LogNotifier {
    async fn notify_badge_earned(&self, event: &BadgeEarned) -> Result<(), NotifyError> {
        tracing::info!(
            student_email = %event.student_email,
            badge = %event.badge_name,
            "Badge earned: {} received '{}'",
            event.student_name,
            event.badge_name
        );
        Ok(())
    }
}

/// POSTs the notification as JSON to an external mail/notification service.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl BadgeNotifier for WebhookNotifier {
    async fn notify_badge_earned(&self, event: &BadgeEarned) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({
                "type": "badge_earned",
                "to": event.student_email,
                "student_name": event.student_name,
                "badge_name": event.badge_name,
                "badge_description": event.badge_description,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(NotifyError::Rejected(resp.status()));
        }
        Ok(())
    }
}
