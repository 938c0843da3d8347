//! Runtime patterns for dispatching valuation calls.
//!
//! This module provides:
//!
//! - **Cancellation**: a run-wide signal that stops new work promptly
//! - **Call Gate**: the one global bound on in-flight valuation calls
//! - **Call Metrics**: call counts, failures, timeouts and latency
//!
//! # Example
//!
//! ```rust,ignore
//! use vegamap_engine::runtime::{CallGate, RunCancellation};
//!
//! let gate = CallGate::new(8);
//! let cancel = RunCancellation::new();
//!
//! let _permit = gate.acquire(&cancel).await?;
//! let response = client.evaluate(&request).await;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// CANCELLATION
// =============================================================================

/// Run-wide cancellation signal.
///
/// Cloning shares the signal. Once cancelled, workers stop drawing items;
/// calls already in flight drain.
#[derive(Clone)]
pub struct RunCancellation {
    inner: Arc<CancellationInner>,
}

struct CancellationInner {
    cancelled: AtomicBool,
    cancel_tx: broadcast::Sender<()>,
}

impl RunCancellation {
    /// Creates a signal that has not fired.
    pub fn new() -> Self {
        let (cancel_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(CancellationInner {
                cancelled: AtomicBool::new(false),
                cancel_tx,
            }),
        }
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.inner.cancel_tx.send(());
            tracing::info!("Run cancellation requested");
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.cancel_tx.subscribe();
        if self.is_cancelled() {
            return;
        }
        // Sender lives as long as `self`, so recv only returns on a signal.
        let _ = rx.recv().await;
    }
}

impl Default for RunCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RunCancellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// =============================================================================
// CALL GATE
// =============================================================================

/// Global bound on simultaneous valuation calls.
///
/// Every component that calls the valuation service holds a clone of the
/// same gate, so instrument-level parallelism never multiplies the cap.
#[derive(Clone)]
pub struct CallGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    high_water: Arc<AtomicUsize>,
}

impl CallGate {
    /// Creates a gate admitting `capacity` calls at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            high_water: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Maximum simultaneous calls.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most calls ever held at once.
    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Waits for a permit, giving up if the run is cancelled first.
    pub async fn acquire(&self, cancel: &RunCancellation) -> EngineResult<CallPermit> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| EngineError::Internal("call gate closed".into()))?
            }
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);

        Ok(CallPermit {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }
}

impl std::fmt::Debug for CallGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGate")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Permit for one in-flight call; released on drop.
pub struct CallPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// CALL METRICS
// =============================================================================

/// Valuation call statistics.
pub struct CallMetrics {
    /// Call count.
    call_count: AtomicU64,
    /// Failed calls, timeouts included.
    failure_count: AtomicU64,
    /// Timed-out calls.
    timeout_count: AtomicU64,
    /// Response times (circular buffer).
    response_times: Mutex<VecDeque<u64>>,
    /// Maximum response times to track.
    max_samples: usize,
}

impl CallMetrics {
    /// Creates a new collector keeping the last `max_samples` latencies.
    pub fn new(max_samples: usize) -> Self {
        Self {
            call_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            response_times: Mutex::new(VecDeque::with_capacity(max_samples)),
            max_samples,
        }
    }

    /// Records a successful call.
    pub fn record_success(&self, response_time_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(response_time_us);
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call that hit the per-call timeout.
    pub fn record_timeout(&self) {
        self.record_failure();
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_response_time(&self, us: u64) {
        if self.max_samples == 0 {
            return;
        }
        let mut times = self.response_times.lock();
        if times.len() >= self.max_samples {
            times.pop_front();
        }
        times.push_back(us);
    }

    /// Returns the current metrics snapshot.
    pub fn snapshot(&self) -> CallMetricsSnapshot {
        let times = self.response_times.lock();
        let call_count = self.call_count.load(Ordering::Relaxed);
        let failure_count = self.failure_count.load(Ordering::Relaxed);

        let (avg_response_time_us, p99_response_time_us) = if times.is_empty() {
            (0, 0)
        } else {
            let mut sorted: Vec<_> = times.iter().copied().collect();
            sorted.sort_unstable();
            let avg = sorted.iter().sum::<u64>() / sorted.len() as u64;
            let p99_idx = ((sorted.len() as f64 * 0.99) as usize).min(sorted.len() - 1);
            (avg, sorted[p99_idx])
        };

        CallMetricsSnapshot {
            call_count,
            failure_count,
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            failure_rate: if call_count > 0 {
                failure_count as f64 / call_count as f64
            } else {
                0.0
            },
            avg_response_time_us,
            p99_response_time_us,
        }
    }
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Snapshot of call metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetricsSnapshot {
    /// Total calls.
    pub call_count: u64,
    /// Failed calls.
    pub failure_count: u64,
    /// Timed-out calls.
    pub timeout_count: u64,
    /// Failure rate (0.0 to 1.0).
    pub failure_rate: f64,
    /// Average response time in microseconds.
    pub avg_response_time_us: u64,
    /// 99th percentile response time in microseconds.
    pub p99_response_time_us: u64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancellation_flag() {
        let cancel = RunCancellation::new();
        let clone = cancel.clone();
        assert!(!clone.is_cancelled());

        cancel.cancel();
        cancel.cancel();
        assert!(clone.is_cancelled());

        // Already-cancelled signal resolves immediately.
        tokio_test::block_on(clone.cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves() {
        let cancel = RunCancellation::new();
        let waiter = cancel.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_gate_tracks_high_water() {
        let gate = CallGate::new(2);
        let cancel = RunCancellation::new();

        let a = gate.acquire(&cancel).await.unwrap();
        let b = gate.acquire(&cancel).await.unwrap();
        assert_eq!(gate.in_flight(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(20), gate.acquire(&cancel)).await;
        assert!(blocked.is_err());

        drop(a);
        let _c = gate.acquire(&cancel).await.unwrap();
        drop(b);
        assert_eq!(gate.in_flight(), 1);
        assert_eq!(gate.high_water_mark(), 2);
    }

    #[tokio::test]
    async fn test_gate_gives_up_on_cancel() {
        let gate = CallGate::new(1);
        let cancel = RunCancellation::new();
        let _held = gate.acquire(&cancel).await.unwrap();

        let waiter_gate = gate.clone();
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move { waiter_gate.acquire(&waiter_cancel).await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_call_metrics() {
        let metrics = CallMetrics::new(100);

        metrics.record_success(100);
        metrics.record_success(300);
        metrics.record_timeout();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.call_count, 4);
        assert_eq!(snapshot.failure_count, 2);
        assert_eq!(snapshot.timeout_count, 1);
        assert_eq!(snapshot.avg_response_time_us, 200);
        assert!((snapshot.failure_rate - 0.5).abs() < 1e-12);
    }
}
