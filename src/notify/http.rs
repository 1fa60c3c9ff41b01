//! HTTP notifier - POSTs notices to a rendering service.
//!
//! # Example
//!
//! ```rust,ignore
//! use hookfold::notify::HttpNotifier;
//! use std::time::Duration;
//!
//! let notifier = HttpNotifier::new("https://renderer.internal/notices")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_retries(2);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info, warn};

use super::{Notice, Notifier, NotifyError};

/// Default timeout for delivery requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of retries on 5xx errors
const DEFAULT_RETRIES: u32 = 2;

/// Delivers notices to an HTTP endpoint as JSON.
///
/// Retries transport failures and 5xx responses; 4xx responses are
/// treated as final since resending the same notice will not change the
/// answer.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    /// Target URL for the rendering service
    url: String,

    /// HTTP client (reused for connection pooling)
    client: Client,

    /// Request timeout
    timeout: Duration,

    /// Number of retries on 5xx errors
    retries: u32,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    async fn send_request(&self, notice: &Notice) -> Result<reqwest::Response, NotifyError> {
        let mut last_error = None;
        let mut attempts = 0;

        while attempts <= self.retries {
            if attempts > 0 {
                debug!(
                    attempt = attempts,
                    max_retries = self.retries,
                    "Retrying notice delivery"
                );
            }

            let result = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(notice)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    // Success
                    if status.is_success() {
                        return Ok(response);
                    }

                    // Client error - don't retry
                    if status.is_client_error() {
                        warn!(
                            status = %status,
                            url = %self.url,
                            "Rendering service returned client error"
                        );
                        return Ok(response);
                    }

                    if status.is_server_error() {
                        warn!(
                            status = %status,
                            url = %self.url,
                            attempt = attempts,
                            "Rendering service returned server error, will retry"
                        );
                        last_error = Some(NotifyError::Failed(format!("server error: {status}")));
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        url = %self.url,
                        attempt = attempts,
                        "Notice delivery request failed"
                    );
                    last_error = Some(NotifyError::Http(e));
                }
            }

            attempts += 1;
        }

        Err(last_error.unwrap_or_else(|| NotifyError::Failed("unknown error".into())))
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        debug!(
            url = %self.url,
            kind = %notice.kind,
            channel = %notice.channel_id,
            "Sending notice"
        );

        let response = self.send_request(notice).await?;
        let status = response.status();

        if status.is_success() {
            info!(
                url = %self.url,
                status = %status,
                kind = %notice.kind,
                "Notice delivered"
            );
            Ok(())
        } else {
            error!(
                url = %self.url,
                status = %status,
                kind = %notice.kind,
                "Notice delivery failed"
            );
            Err(NotifyError::Failed(format!(
                "rendering service returned status {status}"
            )))
        }
    }
}
