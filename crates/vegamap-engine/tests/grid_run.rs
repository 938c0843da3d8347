//! End-to-end grid runs against scripted valuation services.

mod common;

use std::time::Duration;

use approx::assert_relative_eq;
use chrono::NaiveDate;

use common::{instrument, ms, strike_row, three_by_two, Reply, ScriptedClient};
use vegamap_engine::{
    BatchOrchestrator, EngineError, InstrumentJob, InstrumentOutcome, ResultStore, StrikeSource,
    SummaryIndex, SummaryQuery,
};
use vegamap_traits::config::{DifferenceScheme, DispatchMode, EngineConfig};
use vegamap_traits::InstrumentId;

const BUMPED: [f64; 6] = [100.5, 101.0, 100.2, 100.8, 99.9, 100.3];

fn config(max_concurrent_calls: usize, call_timeout_ms: u64) -> EngineConfig {
    EngineConfig {
        max_concurrent_calls,
        call_timeout_ms,
        ..Default::default()
    }
}

#[tokio::test]
async fn matrix_matches_forward_difference() {
    // Later cells answer first.
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(1)),
        Some((col, _)) => {
            let index = strike_row(&call.strike_label) * 2 + col;
            Reply::Value(BUMPED[index], ms(5 * (6 - index as u64)))
        }
    });
    let orchestrator = BatchOrchestrator::new(config(4, 1_000), client.clone()).unwrap();

    let run = orchestrator
        .run_one(InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two()))
        .await
        .unwrap();

    let expected = [[200.0, 400.0], [80.0, 320.0], [-40.0, 120.0]];
    assert_eq!(run.matrix().rows(), 3);
    assert_eq!(run.matrix().cols(), 2);
    for (i, row) in expected.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            assert_relative_eq!(run.matrix().get(i, j).unwrap(), *value, max_relative = 1e-9);
        }
    }
    assert_eq!(client.baseline_calls(), 1);
    assert_eq!(client.calls().len(), 7);
    assert_eq!(run.status_text(), "6/6 cells computed");
    assert_eq!(run.average_life(), Some(0.85));
    assert_eq!(run.barrier_level(), 0.7);
}

#[tokio::test]
async fn timed_out_cell_is_nan() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(1)),
        Some((0, _)) if call.strike_label == "1" => Reply::Hang,
        Some((col, _)) => Reply::Value(BUMPED[strike_row(&call.strike_label) * 2 + col], ms(1)),
    });
    let orchestrator = BatchOrchestrator::new(config(4, 50), client).unwrap();

    let run = orchestrator
        .run_one(InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two()))
        .await
        .unwrap();

    assert!(run.matrix().get(1, 0).unwrap().is_nan());
    assert_relative_eq!(run.matrix().get(1, 1).unwrap(), 320.0, max_relative = 1e-9);
    assert_relative_eq!(run.matrix().get(2, 0).unwrap(), -40.0, max_relative = 1e-9);
    assert_eq!(run.failed_cells(), 1);
    assert_eq!(run.status_text(), "5/6 cells computed");
    assert_eq!(orchestrator.call_metrics().timeout_count, 1);
}

#[tokio::test]
async fn failed_cell_does_not_abort_grid() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(0)),
        Some((1, _)) => Reply::Fail(ms(1)),
        Some((_, _)) => Reply::Value(101.0, ms(1)),
    });
    let orchestrator = BatchOrchestrator::new(config(2, 1_000), client).unwrap();

    let run = orchestrator
        .run_one(InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two()))
        .await
        .unwrap();
    assert_eq!(run.failed_cells(), 3);
    assert_eq!(run.status_text(), "3/6 cells computed");
}

#[tokio::test]
async fn baseline_failure_skips_only_that_instrument() {
    let client = ScriptedClient::new(|call| match (call.underlying.as_str(), call.bumped) {
        ("X", None) => Reply::Fail(ms(1)),
        (_, None) => Reply::Value(100.0, ms(1)),
        (_, Some((col, _))) => Reply::Value(BUMPED[strike_row(&call.strike_label) * 2 + col], ms(2)),
    });
    let orchestrator = BatchOrchestrator::new(config(3, 1_000), client.clone()).unwrap();

    let report = orchestrator
        .run(vec![
            InstrumentJob::with_axes(instrument("X", "X"), three_by_two()),
            InstrumentJob::with_axes(instrument("Y", "Y"), three_by_two()),
        ])
        .await
        .unwrap();

    assert_eq!(report.outcomes().len(), 2);
    let x = report.get(&InstrumentId::new("X")).unwrap();
    assert!(x.is_failed());
    assert!(x.status_text().contains("baseline"));

    match report.get(&InstrumentId::new("Y")).unwrap() {
        InstrumentOutcome::Completed(run) => assert!(run.is_fully_computed()),
        other => panic!("Y should complete, got {other:?}"),
    }
    // No bumped cell of X was dispatched.
    assert!(client
        .calls()
        .iter()
        .filter(|c| c.underlying == "X")
        .all(|c| c.is_baseline()));
}

#[tokio::test]
async fn global_bound_holds_across_instruments() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(2)),
        Some(_) => Reply::Value(100.1, ms(10)),
    });
    let orchestrator = BatchOrchestrator::new(config(3, 1_000), client.clone()).unwrap();

    let jobs = (0..4)
        .map(|i| {
            let id = format!("N{i}");
            InstrumentJob::with_axes(instrument(&id, &id), three_by_two())
        })
        .collect();
    let report = orchestrator.run(jobs).await.unwrap();

    assert_eq!(report.runs().count(), 4);
    assert!(client.high_water_mark() <= 3);
    assert!(orchestrator.gate().high_water_mark() <= 3);
    assert_eq!(orchestrator.gate().in_flight(), 0);
    assert_eq!(client.calls().len(), 4 * 7);
}

#[tokio::test]
async fn per_row_mode_values_one_baseline_per_strike() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0 + strike_row(&call.strike_label) as f64, ms(1)),
        Some((col, _)) => {
            let row = strike_row(&call.strike_label);
            Reply::Value(100.0 + row as f64 + 0.0025 * (col + 1) as f64, ms(1))
        }
    });
    let config = EngineConfig {
        dispatch_mode: DispatchMode::PerRow,
        ..config(4, 1_000)
    };
    let orchestrator = BatchOrchestrator::new(config, client.clone()).unwrap();

    let run = orchestrator
        .run_one(InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two()))
        .await
        .unwrap();

    assert_eq!(client.baseline_calls(), 3);
    for row in 0..3 {
        assert_relative_eq!(run.matrix().get(row, 0).unwrap(), 1.0, max_relative = 1e-6);
        assert_relative_eq!(run.matrix().get(row, 1).unwrap(), 2.0, max_relative = 1e-6);
    }
}

#[tokio::test]
async fn central_scheme_uses_paired_bumps() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(0)),
        Some((_, size)) if size > 0.0 => Reply::Value(100.5, ms(1)),
        Some(_) => Reply::Value(99.7, ms(1)),
    });
    let config = EngineConfig {
        difference_scheme: DifferenceScheme::Central,
        ..config(4, 1_000)
    };
    let orchestrator = BatchOrchestrator::new(config, client.clone()).unwrap();

    let run = orchestrator
        .run_one(InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two()))
        .await
        .unwrap();

    assert_relative_eq!(run.matrix().get(0, 0).unwrap(), 160.0, max_relative = 1e-9);
    assert_eq!(client.calls().len(), 1 + 12);
}

#[tokio::test]
async fn cancellation_discards_partial_results() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(0)),
        Some(_) => Reply::Value(100.1, ms(20)),
    });
    let orchestrator = BatchOrchestrator::new(config(1, 1_000), client.clone()).unwrap();
    let cancel = orchestrator.cancellation();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });
    let result = orchestrator
        .run(vec![InstrumentJob::with_axes(instrument("NOTE", "NDX.IDX"), three_by_two())])
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert!(client.calls().len() < 7);
}

#[tokio::test]
async fn invalid_grid_marks_instrument_failed() {
    let client = ScriptedClient::new(|_| Reply::Value(100.0, ms(0)));
    let orchestrator = BatchOrchestrator::new(config(2, 1_000), client.clone()).unwrap();

    let report = orchestrator
        .run(vec![
            InstrumentJob::new(instrument("BAD", "BAD"), StrikeSource::Listed(vec![110.0, 100.0])),
            InstrumentJob::with_axes(instrument("OK", "OK"), three_by_two()),
        ])
        .await
        .unwrap();

    assert!(report.outcomes()[0].is_failed());
    assert!(!report.outcomes()[1].is_failed());
    assert!(client.calls().iter().all(|c| c.underlying == "OK"));
}

#[tokio::test]
async fn zero_bump_is_rejected_before_dispatch() {
    let client = ScriptedClient::new(|_| Reply::Value(100.0, ms(0)));
    let config = EngineConfig {
        bump_size: 0.0,
        ..Default::default()
    };
    assert!(matches!(
        BatchOrchestrator::new(config, client.clone()),
        Err(EngineError::Validation(_))
    ));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn partitioned_grid_and_summary() {
    let client = ScriptedClient::new(|call| match call.bumped {
        None => Reply::Value(100.0, ms(0)),
        Some((col, _)) => Reply::Value(100.0 + 0.0001 * col as f64, ms(0)),
    });
    let orchestrator = BatchOrchestrator::new(config(8, 1_000), client.clone()).unwrap();
    let spot = instrument("NOTE", "NDX.IDX").reference_level();
    let strikes: Vec<f64> = [0.5, 0.75, 0.9, 1.0, 1.1, 1.3].iter().map(|r| r * spot).collect();

    let report = orchestrator
        .run(vec![InstrumentJob::new(
            instrument("NOTE", "NDX.IDX"),
            StrikeSource::Listed(strikes),
        )])
        .await
        .unwrap();
    let run = report.runs().next().unwrap();
    assert_eq!(run.matrix().rows(), 5);
    assert_eq!(run.matrix().cols(), 10);
    assert_eq!(client.baseline_calls(), 1);
    assert_eq!(client.calls().len(), 1 + 50);

    let store = ResultStore::new();
    store.insert_all(report.into_runs());

    let valuation_date = NaiveDate::from_ymd_opt(2025, 7, 7).unwrap();
    let outcome = SummaryIndex::from_store(&store)
        .query(&SummaryQuery::new(valuation_date, 9.0, 100.0, 2))
        .unwrap();
    let rows = outcome.rows();
    assert_eq!(rows.len(), 2);
    // 3m and 15m tie at six months from 9m; the lower index wins.
    assert_eq!(rows[0].tenor.to_string(), "9m");
    assert_eq!(rows[1].tenor.to_string(), "3m");
    assert_relative_eq!(rows[0].strike, 1.0, epsilon = 1e-12);

    let progress = orchestrator.progress().snapshot_text();
    assert_eq!(progress, "NOTE: 50/50 cells resolved");
}
