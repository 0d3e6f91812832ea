use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use subproc::{
    DelayPeriod, EventRegistry, LedgerAdapter, LedgerFuture, LedgerOperation, ProcessorConfig,
    Runner, SubscriptionTarget, TransactionReceipt, TxOptions,
};
use tokio::time::{sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const DEFAULT_PROCESSING_DELAY_SECS: u64 = 60;
const DEFAULT_CATCH_LATE_DELAY_SECS: u64 = 3_600;
const DEFAULT_STOP_CHECKING_DELAY_SECS: u64 = 86_400;
const DEFAULT_TICK_MS: u64 = 2_000;
const DEFAULT_RELOAD_SECS: u64 = 15;
const DEFAULT_LEDGER_LATENCY_MS: u64 = 200;
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    init_demo_tracing();

    let args = DemoArgs::from_env()?;
    let config = args.to_processor_config()?;
    tracing::info!(
        operator = %config.operator(),
        events_file = args.events_file.as_deref().unwrap_or("<none>"),
        "starting subscription service node"
    );

    let ledger = LoggingLedger::new(Duration::from_millis(args.ledger_latency_ms));
    let mut runner = Runner::new(config, ledger);

    let reload_token = CancellationToken::new();
    let reload_handle = args.events_file.clone().map(|path| {
        spawn_event_reloader(
            path,
            runner.registry(),
            Duration::from_secs(args.reload_secs),
            reload_token.clone(),
        )
    });

    let result = runner.run_until_ctrl_c().await;
    reload_token.cancel();
    if let Some(handle) = reload_handle {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "event reloader task panicked");
        }
    }

    let snapshot = runner.telemetry().snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        activations = snapshot.activations,
        processed = snapshot.processed,
        caught_late = snapshot.caught_late,
        failures = snapshot.dispatch_failures,
        "service node stopped"
    );
    result
}

fn init_demo_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    subproc::init_tracing();
}

struct DemoArgs {
    operator: String,
    events_file: Option<String>,
    processing_secs: u64,
    catch_late_secs: u64,
    stop_checking_secs: u64,
    tick_ms: u64,
    reload_secs: u64,
    ledger_latency_ms: u64,
    catch_late_unclaimed: bool,
}

impl DemoArgs {
    fn from_env() -> Result<Self> {
        let operator = env::var("SUBPROC_OPERATOR").context("SUBPROC_OPERATOR must be set")?;
        let events_file = env::var("SUBPROC_EVENTS_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let processing_secs = parse_env_with_default(
            "SUBPROC_PROCESSING_DELAY_SECS",
            DEFAULT_PROCESSING_DELAY_SECS,
        )?;
        let catch_late_secs = parse_env_with_default(
            "SUBPROC_CATCH_LATE_DELAY_SECS",
            DEFAULT_CATCH_LATE_DELAY_SECS,
        )?;
        let stop_checking_secs = parse_env_with_default(
            "SUBPROC_STOP_CHECKING_DELAY_SECS",
            DEFAULT_STOP_CHECKING_DELAY_SECS,
        )?;
        let tick_ms = parse_env_with_default("SUBPROC_TICK_MS", DEFAULT_TICK_MS)?;
        let reload_secs = parse_env_with_default("SUBPROC_RELOAD_SECS", DEFAULT_RELOAD_SECS)?;
        let ledger_latency_ms =
            parse_env_with_default("SUBPROC_LEDGER_LATENCY_MS", DEFAULT_LEDGER_LATENCY_MS)?;
        let catch_late_unclaimed = parse_env_with_default("SUBPROC_CATCH_LATE_UNCLAIMED", false)?;

        ensure!(tick_ms > 0, "SUBPROC_TICK_MS must be greater than 0");
        ensure!(reload_secs > 0, "SUBPROC_RELOAD_SECS must be greater than 0");

        Ok(Self {
            operator,
            events_file,
            processing_secs,
            catch_late_secs,
            stop_checking_secs,
            tick_ms,
            reload_secs,
            ledger_latency_ms,
            catch_late_unclaimed,
        })
    }

    fn to_processor_config(&self) -> Result<ProcessorConfig> {
        let delays = DelayPeriod::from_secs(
            self.processing_secs,
            self.catch_late_secs,
            self.stop_checking_secs,
        )?;

        ProcessorConfig::builder()
            .operator(self.operator.as_str())
            .delays(delays)
            .tick_interval(Duration::from_millis(self.tick_ms))
            .catch_late_unclaimed(self.catch_late_unclaimed)
            .build()
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

/// Re-reads the events file on an interval, standing in for an indexer push.
fn spawn_event_reloader(
    path: String,
    registry: std::sync::Arc<EventRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match load_events(&path, &registry).await {
                        Ok(count) => {
                            tracing::debug!(path = %path, count, "reloaded subscription events");
                        }
                        Err(err) => {
                            tracing::warn!(
                                path = %path,
                                error = %format!("{err:#}"),
                                "failed to reload subscription events"
                            );
                        }
                    }
                }
            }
        }
    })
}

async fn load_events(path: &str, registry: &EventRegistry) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {path}"))?;
    registry.set_events_json(&raw)
}

/// Ledger adapter that logs each submission and answers with a synthetic receipt.
struct LoggingLedger {
    latency: Duration,
    nonce: AtomicU64,
}

impl LoggingLedger {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            nonce: AtomicU64::new(0),
        }
    }

    fn submit_logged<'a>(
        &'a self,
        operation: LedgerOperation,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        Box::pin(async move {
            sleep(self.latency).await;
            let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                method = operation.method(),
                contract = %target.contract_address,
                payment = %target.payment_identifier,
                from = %options.sender,
                gas = options.gas_limit,
                gas_price = options.gas_price as u64,
                nonce,
                "submitted ledger transaction"
            );
            Ok(TransactionReceipt::new(format!("0x{nonce:064x}")))
        })
    }
}

impl LedgerAdapter for LoggingLedger {
    fn activate<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_logged(LedgerOperation::Activate, target, options)
    }

    fn process<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_logged(LedgerOperation::Process, target, options)
    }

    fn catch_late<'a>(
        &'a self,
        target: &'a SubscriptionTarget,
        options: &'a TxOptions,
    ) -> LedgerFuture<'a> {
        self.submit_logged(LedgerOperation::CatchLate, target, options)
    }
}
