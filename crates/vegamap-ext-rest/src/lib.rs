//! # Vegamap REST Extension
//!
//! [`RestValuationClient`] posts each [`ValuationRequest`] as JSON to a
//! valuation service and reads the requested outputs from the JSON object
//! it returns:
//!
//! ```text
//! POST {valuation_url}
//! {"term_sheet": {...}, "bump": {...}, "controls": {...}, "outputs": [...]}
//!
//! 200 OK
//! {"FairValue": 98.71, "Vega": 0.41, "AverageLife": 1.9}
//! ```
//!
//! One client is built per process and shared by every component that
//! issues valuation calls.

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use vegamap_traits::config::EngineConfig;
use vegamap_traits::valuation::{ValuationRequest, ValuationResponse};
use vegamap_traits::{TraitError, ValuationClient};

/// Valuation service reached over HTTP.
#[derive(Debug, Clone)]
pub struct RestValuationClient {
    url: String,
    client: reqwest::Client,
}

impl RestValuationClient {
    /// Client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TraitError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TraitError::ConnectionFailed(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// Client for the configured service URL and call timeout.
    pub fn from_config(config: &EngineConfig) -> Result<Self, TraitError> {
        Self::new(config.valuation_url.clone(), config.call_timeout())
    }

    /// Service URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn transport_error(err: reqwest::Error) -> TraitError {
    if err.is_timeout() {
        TraitError::Timeout
    } else if err.is_connect() {
        TraitError::ConnectionFailed(err.to_string())
    } else {
        TraitError::ServiceError(err.to_string())
    }
}

#[async_trait]
impl ValuationClient for RestValuationClient {
    async fn evaluate(&self, request: &ValuationRequest) -> Result<ValuationResponse, TraitError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            warn!(url = %self.url, %status, "valuation service rejected request");
            return Err(TraitError::ServiceError(format!("HTTP {status}: {body}")));
        }

        let fields: BTreeMap<String, serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| TraitError::ParseError(format!("response is not a JSON object: {e}")))?;
        debug!(url = %self.url, strike = %request.bump().strike_label, "valuation received");
        ValuationResponse::from_fields(&fields, request.outputs())
    }

    fn name(&self) -> &str {
        "rest"
    }
}
