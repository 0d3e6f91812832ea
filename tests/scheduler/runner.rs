use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::support::{
    helpers::{config_builder, event, init_tracing, wait_for_calls},
    recording_ledger::RecordingLedger,
};
use anyhow::{Context, Result};
use subproc::{LedgerOperation, ManualClock, Runner};
use tokio::time::{sleep, timeout};

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_dispatches_with_the_system_clock() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let mut runner = Runner::new(config_builder().build()?, ledger.clone());

    runner
        .registry()
        .set_events(vec![event("due-now", unix_now().saturating_sub(1))]);
    runner.start().await?;
    assert!(runner.is_running());

    wait_for_calls(&ledger, 1, Duration::from_secs(2)).await?;
    runner.stop().await?;
    assert!(!runner.is_running());

    let calls = ledger.calls();
    assert_eq!(calls.len(), 1, "each event is dispatched once");
    assert_eq!(calls[0].operation, LedgerOperation::Activate);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_waits_for_events_before_classifying() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let clock = Arc::new(ManualClock::from_secs(10_000));
    let mut runner = Runner::with_clock(config_builder().build()?, ledger.clone(), clock);

    runner.start().await?;
    sleep(Duration::from_millis(60)).await;
    let telemetry = runner.telemetry().snapshot();
    assert!(telemetry.ticks > 0);
    assert_eq!(telemetry.ticks, telemetry.skipped_ticks);
    assert_eq!(ledger.call_count(), 0);

    runner.registry().set_events(vec![event("late-arrival", 9_000)]);
    wait_for_calls(&ledger, 1, Duration::from_secs(2)).await?;
    runner.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_can_restart_after_stop() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new();
    let clock = Arc::new(ManualClock::from_secs(5_000));
    let mut runner = Runner::with_clock(config_builder().build()?, ledger.clone(), clock);
    let registry = runner.registry();

    registry.set_events(vec![event("before-restart", 4_000)]);
    runner.start().await?;
    wait_for_calls(&ledger, 1, Duration::from_secs(2)).await?;
    runner.stop().await?;

    registry.set_events(vec![
        event("before-restart", 4_000),
        event("after-restart", 4_000),
    ]);
    runner.start().await?;
    wait_for_calls(&ledger, 2, Duration::from_secs(2)).await?;
    runner.stop().await?;

    assert_eq!(ledger.payments(), vec!["before-restart", "after-restart"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_cancellation_stops_run_until_ctrl_c() -> Result<()> {
    init_tracing();
    let ledger = RecordingLedger::new().hanging_on("stuck");
    let clock = Arc::new(ManualClock::from_secs(5_000));
    let mut runner = Runner::with_clock(config_builder().build()?, ledger.clone(), clock);
    runner.registry().set_events(vec![event("stuck", 4_000)]);
    let token = runner.cancellation_token();

    let handle = tokio::spawn(async move {
        let outcome = runner.run_until_ctrl_c().await;
        (runner, outcome)
    });

    wait_for_calls(&ledger, 1, Duration::from_secs(2)).await?;
    token.cancel();

    let (runner, outcome) = timeout(Duration::from_secs(2), handle)
        .await
        .context("runner should stop once its token is cancelled")??;
    outcome?;
    assert!(!runner.is_running());
    assert!(
        !runner.cancellation_token().is_cancelled(),
        "a stopped runner hands out a fresh token"
    );
    Ok(())
}
