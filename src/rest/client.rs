use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::Result;
use super::types::{ApiStatus, SymbolsResponse};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("bybit-streams-rs/", env!("CARGO_PKG_VERSION"));

/**
 * The REST surface the stream manager relies on.
 *
 * The manager never requires this collaborator to be thread-safe beyond
 * single-call granularity.
 */
#[async_trait]
pub trait BybitRestApi: Send + Sync {
    /**
     * Enumerates tradable markets of one category.
     */
    async fn get_symbols(&self, category: &str) -> Result<SymbolsResponse>;

    /**
     * Tears down the listen key attached to a stream.
     *
     * # Returns
     * - The raw endpoint response plus its API-level status.
     */
    async fn delete_listen_key(&self, stream_id: &str) -> Result<(Value, ApiStatus)>;
}

/**
 * REST client implementation backed by a pooled HTTP client.
 *
 * # Fields
 * - `base_uri`: RESTful base URI of the exchange.
 * - `client`: HTTP client with connection pooling.
 */
pub struct BybitRestClient {
    base_uri: String,
    client: reqwest::Client,
}

impl BybitRestClient {
    /**
     * Creates a new REST client for the given base URI.
     *
     * # Arguments
     * - `base_uri`: RESTful base, e.g. `https://api.bybit.com`.
     *
     * # Returns
     * - `Self`: New REST client instance.
     */
    pub fn new(base_uri: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECTION_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_uri: base_uri.into(),
            client,
        })
    }

    /**
     * Reads a response body as JSON, surfacing HTTP-level failures.
     */
    pub(crate) async fn handle_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.context("Failed to read response")?;

        if !status.is_success() {
            debug!(
                http_status = %status,
                body = %text,
                "Bybit REST error response"
            );
            anyhow::bail!("Bybit REST request failed with HTTP {status}: {text}");
        }

        serde_json::from_str(&text).context("Failed to decode response body")
    }

    fn api_status(value: &Value) -> ApiStatus {
        ApiStatus {
            code: value.get("retCode").and_then(Value::as_i64).unwrap_or(-1),
            message: value
                .get("retMsg")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        }
    }
}

#[async_trait]
impl BybitRestApi for BybitRestClient {
    #[instrument(skip(self))]
    async fn get_symbols(&self, category: &str) -> Result<SymbolsResponse> {
        let start = std::time::Instant::now();
        let url = format!("{}/v5/market/instruments-info", self.base_uri);
        let response = self
            .client
            .get(&url)
            .query(&[("category", category)])
            .send()
            .await
            .context("Failed to request instruments info")?;

        let value = self.handle_response(response).await?;
        let symbols: SymbolsResponse =
            serde_json::from_value(value).context("Failed to decode instruments info")?;

        debug!(
            duration_us = start.elapsed().as_micros(),
            category,
            symbols = symbols.symbols().len(),
            "Instruments info retrieved"
        );
        Ok(symbols)
    }

    #[instrument(skip(self))]
    async fn delete_listen_key(&self, stream_id: &str) -> Result<(Value, ApiStatus)> {
        let url = format!("{}/v5/private/listen-key/delete", self.base_uri);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "streamId": stream_id }))
            .send()
            .await
            .context("Failed to request listen key deletion")?;

        let value = self.handle_response(response).await?;
        let status = Self::api_status(&value);
        Ok((value, status))
    }
}
