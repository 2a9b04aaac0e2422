// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Origin-Mismatch Notifications
//!
//! When a refresh arrives from a different IP than the one its refresh token
//! was issued against, the token service raises an [`OriginAlert`] through a
//! [`NotificationSink`]. Delivery is best-effort: failures are logged by the
//! caller and never reach the HTTP response.
//!
//! ## Sinks
//!
//! - [`LogNotifier`] - writes the alert to the log (default)
//! - [`WebhookNotifier`] - POSTs the alert as JSON to `NOTIFY_WEBHOOK_URL`

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use url::Url;
use uuid::Uuid;

/// Alert raised when a refresh comes from an unexpected origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginAlert {
    /// Contact address of the identity
    pub address: String,
    pub guid: Uuid,
    /// Origin bound into the refresh token
    pub issued_ip: String,
    /// Origin the refresh request came from
    pub observed_ip: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("identity lookup failed: {0}")]
    Lookup(String),

    #[error("no contact address on file for {0}")]
    NoAddress(Uuid),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("notification timed out")]
    Timeout,
}

/// Fire-and-forget alert delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &OriginAlert) -> Result<(), NotificationError>;
}

/// Sink that only logs the alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, alert: &OriginAlert) -> Result<(), NotificationError> {
        warn!(
            address = %alert.address,
            guid = %alert.guid,
            issued_ip = %alert.issued_ip,
            observed_ip = %alert.observed_ip,
            "Refresh from unexpected origin, sending warning"
        );
        Ok(())
    }
}

/// Sink that POSTs alerts to an HTTP endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: Url,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a webhook sink with a per-request timeout.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, alert: &OriginAlert) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotificationError::Timeout
                } else {
                    NotificationError::Delivery(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "HTTP {} from webhook",
                response.status()
            )));
        }
        Ok(())
    }
}
