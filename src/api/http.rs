//! HTTP implementation of [`BatchTransport`] over reqwest.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::constants::{API_PREFIX, STATUS_RETRY_BASE_DELAY_MS, STATUS_RETRY_MAX_DELAY_MS};
use crate::error::{CoordinatorError, Result};
use crate::model::TransactionId;
use crate::protocol::{BatchSubmitRequest, BatchSubmitResponse, TransactionRecord};

use super::transport::BatchTransport;

/// HTTP client for the charting batch endpoints.
///
/// Writes (`submit_batch`, `retry_transaction`) are issued exactly once per
/// call: their server-side effect on failure is unknown, so replaying them
/// automatically could duplicate clinical records. The status read retries
/// transient failures with exponential backoff.
#[derive(Clone)]
pub struct HttpBatchClient {
    client: Client,
    config: ApiConfig,
    base_url: Url,
}

impl std::fmt::Debug for HttpBatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBatchClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.config.timeout_ms)
            .field("max_retries", &self.config.max_retries)
            .field("auth_enabled", &self.config.auth_token.is_some())
            .finish()
    }
}

impl HttpBatchClient {
    /// Create a new client from the given configuration.
    ///
    /// Validates the base URL, installs the request timeout and user agent,
    /// and sets a bearer-token authorization header when a token is
    /// configured.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CoordinatorError::config_error(format!("Invalid base URL: {e}")))?;

        let mut client_builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("chartbatch-core/{}", env!("CARGO_PKG_VERSION")));

        if let Some(token) = &config.auth_token {
            let mut default_headers = reqwest::header::HeaderMap::new();
            default_headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {token}").parse().map_err(|e| {
                    CoordinatorError::config_error(format!("Invalid auth token: {e}"))
                })?,
            );
            client_builder = client_builder.default_headers(default_headers);
            debug!("Configured bearer token authentication");
        }

        let client = client_builder.build().map_err(|e| {
            CoordinatorError::config_error(format!("Failed to create HTTP client: {e}"))
        })?;

        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout_ms,
            auth_enabled = config.auth_token.is_some(),
            "Created charting batch API client"
        );

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{API_PREFIX}{path}"))
            .map_err(|e| CoordinatorError::config_error(format!("Failed to construct URL: {e}")))
    }

    /// Backoff before the next status read attempt: exponential in the
    /// attempt number, capped at [`STATUS_RETRY_MAX_DELAY_MS`] so a large
    /// configured retry budget widens the window instead of the waits.
    fn status_retry_delay(retries: u32) -> Duration {
        let exponent = retries.min(6);
        let millis = (STATUS_RETRY_BASE_DELAY_MS << exponent).min(STATUS_RETRY_MAX_DELAY_MS);
        Duration::from_millis(millis)
    }

    /// Decode a response body, mapping non-2xx statuses to `Api` errors
    /// with the body text as the message.
    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(CoordinatorError::api_error(status.as_u16(), text));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl BatchTransport for HttpBatchClient {
    fn transport_name(&self) -> &'static str {
        "http"
    }

    async fn submit_batch(&self, request: &BatchSubmitRequest) -> Result<BatchSubmitResponse> {
        let url = self.endpoint("/batches")?;

        debug!(
            url = %url,
            transaction_id = %request.transaction_id,
            item_count = request.items.len(),
            "Submitting batch"
        );

        // One attempt, ever. The server may have created items even when
        // this call fails; recovery goes through the transaction record.
        let response = self.client.post(url).json(request).send().await?;
        let parsed: BatchSubmitResponse = Self::read_json(response).await?;

        if !parsed.is_success() {
            let message = parsed
                .message
                .unwrap_or_else(|| "server reported failure without a message".to_string());
            return Err(CoordinatorError::api_error(200, message));
        }

        Ok(parsed)
    }

    async fn transaction_status(&self, id: &TransactionId) -> Result<TransactionRecord> {
        let url = self.endpoint(&format!("/transactions/{id}"))?;

        debug!(url = %url, transaction_id = %id, "Fetching transaction status");

        let mut retries = 0;
        loop {
            let outcome = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() || status.is_client_error() {
                        // Client errors carry a definitive answer; decode or
                        // fail without retrying.
                        return Self::read_json(response).await;
                    }
                    let text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    Err(CoordinatorError::api_error(status.as_u16(), text))
                }
                Err(e) => Err(CoordinatorError::Transport(e)),
            };

            retries += 1;
            if retries >= self.config.max_retries {
                return outcome;
            }

            if let Err(e) = &outcome {
                warn!(
                    transaction_id = %id,
                    error = %e,
                    retry = retries,
                    max_retries = self.config.max_retries,
                    "Transient failure fetching transaction status, will retry"
                );
            }

            tokio::time::sleep(Self::status_retry_delay(retries)).await;
        }
    }

    async fn retry_transaction(&self, id: &TransactionId) -> Result<TransactionRecord> {
        let url = self.endpoint(&format!("/transactions/{id}/retry"))?;

        debug!(url = %url, transaction_id = %id, "Requesting transaction retry");

        // User-initiated write: exactly one request per call.
        let response = self.client.post(url).send().await?;
        Self::read_json(response).await
    }
}
