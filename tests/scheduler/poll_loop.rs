use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{config_builder, event, init_tracing, tx_hash, OTHER_OPERATOR},
    recording_ledger::RecordingLedger,
};
use anyhow::Result;
use subproc::{
    CircuitState, DispatchOrder, DispatchState, LedgerOperation, ManualClock, PollScheduler,
};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

fn scheduler_at(
    ledger: &RecordingLedger,
    builder: subproc::ProcessorConfigBuilder,
    now: u64,
) -> Result<(PollScheduler<RecordingLedger>, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::from_secs(now));
    let config = builder.build()?;
    let scheduler = PollScheduler::with_clock(&config, Arc::new(ledger.clone()), clock.clone());
    Ok((scheduler, clock))
}

#[tokio::test]
async fn subscription_moves_from_activation_to_processing() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let (scheduler, clock) = scheduler_at(&ledger, config_builder(), 1_000)?;
    let shutdown = CancellationToken::new();

    scheduler.registry().set_events(vec![event("first", 1_000)]);
    let report = scheduler.tick(&shutdown).await;
    assert_eq!(report.activate.submitted, 1);

    // The indexer lags: the activated event is still reported as pending, next to
    // the follow-up payment that is now due for processing.
    clock.set_secs(1_060);
    scheduler.registry().set_events(vec![
        event("first", 1_000),
        event("second", 1_000).activated(true),
    ]);
    let report = scheduler.tick(&shutdown).await;
    assert_eq!(report.activate.attempted(), 0);
    assert_eq!(report.process.submitted, 1);

    let calls = ledger.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].operation, LedgerOperation::Activate);
    assert_eq!(calls[1].operation, LedgerOperation::Process);
    assert_eq!(calls[1].payment_identifier, "second");
    assert_eq!(calls[1].sender, "0xa11ce");

    let telemetry = scheduler.telemetry().snapshot();
    assert_eq!(telemetry.activations, 1);
    assert_eq!(telemetry.processed, 1);
    Ok(())
}

#[tokio::test]
async fn rival_claims_are_caught_late_from_the_catch_late_boundary() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let (scheduler, clock) = scheduler_at(&ledger, config_builder(), 1_199)?;
    let shutdown = CancellationToken::new();
    let claimed = || vec![event("rival", 1_000).activated(true).claimed_by(OTHER_OPERATOR)];

    scheduler.registry().set_events(claimed());
    assert_eq!(scheduler.tick(&shutdown).await.attempted(), 0);

    clock.set_secs(1_200);
    scheduler.registry().set_events(claimed());
    let report = scheduler.tick(&shutdown).await;
    assert_eq!(report.catch_late.submitted, 1);
    assert_eq!(ledger.calls()[0].operation, LedgerOperation::CatchLate);
    Ok(())
}

#[tokio::test]
async fn events_past_the_stop_checking_window_are_ignored() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let (scheduler, _) = scheduler_at(&ledger, config_builder(), 1_501)?;

    scheduler.registry().set_events(vec![
        event("stale-claimed", 1_000).activated(true).claimed_by(OTHER_OPERATOR),
        event("stale-unclaimed", 1_000).activated(true),
        event("cancelled", 1_500).cancelled(true),
    ]);
    let report = scheduler.tick(&CancellationToken::new()).await;

    assert_eq!(report.attempted(), 0);
    assert!(ledger.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn due_date_order_sorts_within_each_bucket() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let builder = config_builder().dispatch_order(DispatchOrder::DueDate);
    let (scheduler, _) = scheduler_at(&ledger, builder, 2_000)?;

    scheduler.registry().set_events(vec![
        event("late", 1_900),
        event("early", 1_100),
        event("middle", 1_500),
    ]);
    scheduler.tick(&CancellationToken::new()).await;

    assert_eq!(ledger.payments(), vec!["early", "middle", "late"]);
    Ok(())
}

#[tokio::test]
async fn failing_event_does_not_stop_the_batch() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().failing_on("broken");
    let (scheduler, _) = scheduler_at(&ledger, config_builder(), 1_000)?;
    let registry = scheduler.registry();

    registry.set_events(vec![
        event("ok-1", 900),
        event("broken", 900),
        event("ok-2", 900),
    ]);
    let report = scheduler.tick(&CancellationToken::new()).await;

    assert_eq!(report.activate.submitted, 2);
    assert_eq!(report.activate.failed, 1);
    assert_eq!(ledger.payments(), vec!["ok-1", "broken", "ok-2"]);

    let broken = registry
        .dispatch_state(&tx_hash("broken"))
        .expect("failed events stay in the dedup set");
    assert_eq!(broken.state, DispatchState::Failed);
    assert_eq!(scheduler.telemetry().dispatch_failures(), 1);
    Ok(())
}

#[tokio::test]
async fn default_config_sends_every_event_despite_repeated_failures() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().failing_all();
    let (scheduler, _) = scheduler_at(&ledger, config_builder(), 1_000)?;

    scheduler
        .registry()
        .set_events((1..=8).map(|n| event(&format!("p{n}"), 900)));
    let report = scheduler.tick(&CancellationToken::new()).await;

    assert_eq!(report.activate.failed, 8);
    assert_eq!(report.activate.deferred, 0);
    assert_eq!(ledger.call_count(), 8);
    Ok(())
}

#[tokio::test]
async fn open_circuit_defers_events_without_marking_them() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().failing_all();
    let builder = config_builder()
        .breaker_failure_threshold(2)
        .breaker_cooldown(Duration::from_millis(30));
    let (scheduler, _) = scheduler_at(&ledger, builder, 1_000)?;
    let registry = scheduler.registry();
    let shutdown = CancellationToken::new();

    registry.set_events((1..=4).map(|n| event(&format!("p{n}"), 900)));
    let report = scheduler.tick(&shutdown).await;

    assert_eq!(report.activate.failed, 2);
    assert_eq!(report.activate.deferred, 2);
    let breaker = scheduler.breaker().expect("breaker enabled by config");
    assert_eq!(breaker.snapshot().state, CircuitState::Open);
    assert!(registry.dispatch_state(&tx_hash("p3")).is_none());
    assert!(registry.dispatch_state(&tx_hash("p4")).is_none());

    sleep(Duration::from_millis(50)).await;
    let report = scheduler.tick(&shutdown).await;
    assert_eq!(report.activate.failed, 1, "only the half-open probe goes through");
    assert_eq!(report.activate.deferred, 1);
    assert_eq!(ledger.call_count(), 3);
    assert_eq!(scheduler.telemetry().snapshot().circuit_rejections, 3);
    Ok(())
}

#[tokio::test]
async fn shutdown_interrupts_a_hanging_submission() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().hanging_on("stuck");
    let (scheduler, _) = scheduler_at(&ledger, config_builder(), 1_000)?;
    let scheduler = Arc::new(scheduler);
    let registry = scheduler.registry();
    registry.set_events(vec![event("stuck", 900), event("next", 900)]);

    let shutdown = CancellationToken::new();
    let handle = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.tick(&shutdown).await })
    };

    sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    let report = timeout(Duration::from_secs(1), handle).await??;

    assert!(report.interrupted);
    assert_eq!(ledger.payments(), vec!["stuck"]);
    let stuck = registry
        .dispatch_state(&tx_hash("stuck"))
        .expect("interrupted submissions stay recorded");
    assert_eq!(stuck.state, DispatchState::Pending);
    assert!(registry.dispatch_state(&tx_hash("next")).is_none());

    let report = scheduler.tick(&CancellationToken::new()).await;
    assert_eq!(report.activate.submitted, 1);
    assert_eq!(ledger.payments(), vec!["stuck", "next"]);
    Ok(())
}

#[tokio::test]
async fn slow_ledger_calls_time_out() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().with_latency(Duration::from_millis(500));
    let builder = config_builder().dispatch_timeout(Duration::from_millis(20));
    let (scheduler, _) = scheduler_at(&ledger, builder, 1_000)?;

    scheduler.registry().set_events(vec![event("slow", 900)]);
    let report = scheduler.tick(&CancellationToken::new()).await;

    assert_eq!(report.activate.failed, 1);
    assert_eq!(scheduler.telemetry().snapshot().dispatch_timeouts, 1);
    Ok(())
}
