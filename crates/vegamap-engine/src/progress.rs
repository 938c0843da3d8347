//! Per-instrument progress tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use vegamap_traits::InstrumentId;

/// Progress update for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Instrument being computed.
    pub instrument_id: InstrumentId,
    /// Cells resolved so far.
    pub resolved: usize,
    /// Cells in the grid.
    pub total: usize,
}

impl ProgressEvent {
    /// `"X: 3/6 cells resolved"`.
    pub fn text(&self) -> String {
        format!("{}: {}/{} cells resolved", self.instrument_id, self.resolved, self.total)
    }
}

/// Shared progress board for a batch.
///
/// Counters are atomics; every update is also published to subscribers.
#[derive(Clone)]
pub struct ProgressBoard {
    counters: Arc<DashMap<InstrumentId, Arc<Counter>>>,
    order: Arc<parking_lot::Mutex<Vec<InstrumentId>>>,
    events: broadcast::Sender<ProgressEvent>,
}

struct Counter {
    resolved: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressBoard {
    /// Creates a board whose channel buffers `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            counters: Arc::new(DashMap::new()),
            order: Arc::new(parking_lot::Mutex::new(Vec::new())),
            events,
        }
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Register an instrument and get its tracker.
    pub fn track(&self, instrument_id: InstrumentId, total: usize) -> ProgressTracker {
        let counter = Arc::new(Counter {
            resolved: AtomicUsize::new(0),
            total: AtomicUsize::new(total),
        });
        if self
            .counters
            .insert(instrument_id.clone(), Arc::clone(&counter))
            .is_none()
        {
            self.order.lock().push(instrument_id.clone());
        }
        ProgressTracker {
            instrument_id,
            counter,
            events: self.events.clone(),
        }
    }

    /// Current progress of one instrument.
    pub fn get(&self, instrument_id: &InstrumentId) -> Option<ProgressEvent> {
        self.counters.get(instrument_id).map(|c| ProgressEvent {
            instrument_id: instrument_id.clone(),
            resolved: c.resolved.load(Ordering::SeqCst),
            total: c.total.load(Ordering::SeqCst),
        })
    }

    /// Progress text for every tracked instrument, in registration order.
    pub fn snapshot_text(&self) -> String {
        self.order
            .lock()
            .iter()
            .filter_map(|id| self.get(id))
            .map(|e| e.text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Progress handle for one instrument's grid.
#[derive(Clone)]
pub struct ProgressTracker {
    instrument_id: InstrumentId,
    counter: Arc<Counter>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressTracker {
    /// Tracker that is not attached to any board.
    pub fn detached(instrument_id: InstrumentId, total: usize) -> Self {
        ProgressBoard::new(1).track(instrument_id, total)
    }

    /// Count one resolved cell and publish the new state.
    pub fn cell_resolved(&self) -> ProgressEvent {
        let resolved = self.counter.resolved.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ProgressEvent {
            instrument_id: self.instrument_id.clone(),
            resolved,
            total: self.counter.total.load(Ordering::SeqCst),
        };
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        event
    }

    /// Cells resolved so far.
    pub fn resolved(&self) -> usize {
        self.counter.resolved.load(Ordering::SeqCst)
    }

    /// Cells in the grid.
    pub fn total(&self) -> usize {
        self.counter.total.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_published() {
        let board = ProgressBoard::new(16);
        let mut rx = board.subscribe();
        let tracker = board.track(InstrumentId::new("X"), 2);

        tracker.cell_resolved();
        let second = tracker.cell_resolved();
        assert_eq!(second.resolved, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.resolved, 1);
        assert_eq!(first.total, 2);
    }

    #[test]
    fn test_snapshot_text_order() {
        let board = ProgressBoard::default();
        let y = board.track(InstrumentId::new("Y"), 4);
        board.track(InstrumentId::new("X"), 6);
        y.cell_resolved();

        assert_eq!(
            board.snapshot_text(),
            "Y: 1/4 cells resolved\nX: 0/6 cells resolved"
        );
    }
}
