//! Push relay client
//!
//! Consumes the relay's HTTP contract: POST `{message, subscription}`.
//! Delivery answers `{"success": true}`; failure answers `{"error": ...}`
//! with a non-2xx status. The subscription descriptor is opaque here; it
//! is whatever the browser handed out and the hub stored.

use bentech_proto::{PushAck, PushRequest};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay refused the push ({status}): {message}")]
    Refused { status: u16, message: String },
}

/// Client for one push relay endpoint.
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Forward `message` to the stored subscription via the relay.
    pub async fn send(
        &self,
        message: &str,
        subscription: &serde_json::Value,
    ) -> Result<(), RelayError> {
        let body = PushRequest {
            message: message.to_string(),
            subscription: subscription.clone(),
        };

        let resp = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        let ack: PushAck = resp.json().await.unwrap_or_default();

        if !status.is_success() || !ack.success {
            return Err(RelayError::Refused {
                status: status.as_u16(),
                message: ack
                    .error
                    .unwrap_or_else(|| "unknown relay error".to_string()),
            });
        }
        Ok(())
    }
}
