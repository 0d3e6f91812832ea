use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use subproc::{DelayPeriod, ProcessorConfigBuilder, ProcessorConfig, SubscriptionEvent};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use super::recording_ledger::RecordingLedger;

pub const OPERATOR: &str = "0xA11CE";
pub const OTHER_OPERATOR: &str = "0xB0B";

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Processing opens 50s after the due date, catch-late at 200s, checking stops at 500s.
pub fn config_builder() -> ProcessorConfigBuilder {
    ProcessorConfig::builder()
        .operator(OPERATOR)
        .delays(DelayPeriod::from_secs(50, 200, 500).expect("valid delays"))
        .tick_interval(Duration::from_millis(10))
        .dispatch_timeout(Duration::from_secs(2))
        .metrics_interval(Duration::from_millis(50))
}

pub fn event(payment: &str, due_date: u64) -> SubscriptionEvent {
    SubscriptionEvent::new(format!("0xtx-{payment}"), "0xcontract", payment, due_date)
}

pub fn tx_hash(payment: &str) -> String {
    format!("0xtx-{payment}")
}

pub async fn wait_for_calls(
    ledger: &RecordingLedger,
    target: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = ledger.call_count();
        if current >= target {
            return Ok(());
        }

        if start.elapsed() > timeout {
            bail!(
                "ledger did not receive {target} submissions within {:?} (received: {current})",
                timeout
            );
        }

        sleep(Duration::from_millis(10)).await;
    }
}
