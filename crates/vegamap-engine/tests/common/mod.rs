//! Scripted in-process valuation clients.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use vegamap_engine::{AxisKind, GridAxes, GridAxis};
use vegamap_traits::instrument::{InstrumentSpec, TermSheet};
use vegamap_traits::valuation::{ValuationRequest, ValuationResponse};
use vegamap_traits::{TraitError, UnderlyingId, ValuationClient};

/// What the scripted service does with one call.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Answer with this fair value after the delay.
    Value(f64, Duration),
    /// Fail after the delay.
    Fail(Duration),
    /// Never answer.
    Hang,
}

/// Which scenario a request encodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// First bumped underlying.
    pub underlying: String,
    /// Strike label of the request.
    pub strike_label: String,
    /// Bumped tenor and its signed size, `None` for a baseline.
    pub bumped: Option<(usize, f64)>,
}

impl Call {
    fn of(request: &ValuationRequest) -> Self {
        let bump = request.bump();
        let bumped = bump
            .bumped_tenors()
            .first()
            .map(|col| (*col, bump.tenor_bump_sizes[*col]));
        Self {
            underlying: bump
                .instrument_ids
                .first()
                .map(|u| u.to_string())
                .unwrap_or_default(),
            strike_label: bump.strike_label.clone(),
            bumped,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.bumped.is_none()
    }
}

type Script = dyn Fn(&Call) -> Reply + Send + Sync;

/// Client answering from a script and recording concurrency.
pub struct ScriptedClient {
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(script: impl Fn(&Call) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn baseline_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_baseline()).count()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ValuationClient for ScriptedClient {
    async fn evaluate(&self, request: &ValuationRequest) -> Result<ValuationResponse, TraitError> {
        let call = Call::of(request);
        let reply = (self.script)(&call);
        self.calls.lock().push(call);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match reply {
            Reply::Value(value, delay) => {
                tokio::time::sleep(delay).await;
                Ok(ValuationResponse::fair_value(value).with_average_life(0.85))
            }
            Reply::Fail(delay) => {
                tokio::time::sleep(delay).await;
                Err(TraitError::ServiceError("scripted failure".into()))
            }
            Reply::Hang => {
                std::future::pending::<()>().await;
                Err(TraitError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Row of a strike label on [`three_by_two`].
pub fn strike_row(label: &str) -> usize {
    match label {
        "0.9" => 0,
        "1" => 1,
        "1.1" => 2,
        other => panic!("unexpected strike label {other}"),
    }
}

/// Strike centers `[0.9, 1.0, 1.1]`, tenor centers `[6, 12]` months.
pub fn three_by_two() -> GridAxes {
    GridAxes::new(
        GridAxis::from_centers(AxisKind::Strike, vec![0.9, 1.0, 1.1]).unwrap(),
        GridAxis::from_centers(AxisKind::Tenor, vec![6.0, 12.0]).unwrap(),
        100.0,
    )
    .unwrap()
}

/// Term sheet on a single underlying named `underlying`.
pub fn instrument(id: &str, underlying: &str) -> InstrumentSpec {
    let mut term_sheet = TermSheet::ndx_autocallable();
    term_sheet.stock_ids = vec![UnderlyingId::new(underlying)];
    InstrumentSpec::new(id, term_sheet).unwrap()
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
