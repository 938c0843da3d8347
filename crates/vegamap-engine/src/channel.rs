//! Gated, timed access to the valuation service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use vegamap_traits::valuation::{ValuationRequest, ValuationResponse};
use vegamap_traits::{TraitError, ValuationClient};

use crate::error::EngineError;
use crate::runtime::{CallGate, CallMetrics, RunCancellation};

/// The explicit handle every valuation call goes through.
///
/// Wraps the injected client with the global [`CallGate`], a per-call
/// timeout and call metrics. Cloning shares all of them.
#[derive(Clone)]
pub struct ValuationChannel {
    client: Arc<dyn ValuationClient>,
    gate: CallGate,
    metrics: Arc<CallMetrics>,
    timeout: Duration,
}

impl ValuationChannel {
    /// Create a channel.
    pub fn new(client: Arc<dyn ValuationClient>, gate: CallGate, timeout: Duration) -> Self {
        Self {
            client,
            gate,
            metrics: Arc::new(CallMetrics::default()),
            timeout,
        }
    }

    /// Share an existing metrics collector.
    pub fn with_metrics(mut self, metrics: Arc<CallMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Gate bounding this channel.
    pub fn gate(&self) -> &CallGate {
        &self.gate
    }

    /// Call metrics.
    pub fn metrics(&self) -> &Arc<CallMetrics> {
        &self.metrics
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one request.
    ///
    /// Waits for a gate permit, then bounds the call itself by the timeout.
    /// An elapsed timeout is `TraitError::Timeout`; cancellation while
    /// waiting for a permit is `TraitError::Cancelled`.
    pub async fn evaluate(
        &self,
        request: &ValuationRequest,
        cancel: &RunCancellation,
    ) -> Result<ValuationResponse, TraitError> {
        let _permit = self.gate.acquire(cancel).await.map_err(|e| match e {
            EngineError::Cancelled => TraitError::Cancelled,
            other => TraitError::Internal(other.to_string()),
        })?;

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.client.evaluate(request)).await {
            Ok(Ok(response)) => {
                self.metrics
                    .record_success(started.elapsed().as_micros() as u64);
                Ok(response)
            }
            Ok(Err(e)) => {
                self.metrics.record_failure();
                debug!(client = self.client.name(), error = %e, "Valuation call failed");
                Err(e)
            }
            Err(_) => {
                self.metrics.record_timeout();
                debug!(
                    client = self.client.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Valuation call timed out"
                );
                Err(TraitError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for ValuationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValuationChannel")
            .field("client", &self.client.name())
            .field("gate", &self.gate)
            .field("timeout", &self.timeout)
            .finish()
    }
}
