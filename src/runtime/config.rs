use crate::ledger::circuit_breaker::DEFAULT_COOLDOWN;
use crate::ledger::options::{TxOptions, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE};
use crate::registry::{DedupPolicy, OperatorId};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_TICK_INTERVAL_MS: u64 = 2_000;
const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 30;

/// Offsets after an event's due date that delimit its execution windows.
///
/// Always satisfies `processing <= catch_late <= stop_checking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPeriod {
    processing: Duration,
    catch_late: Duration,
    stop_checking: Duration,
}

impl DelayPeriod {
    pub fn new(processing: Duration, catch_late: Duration, stop_checking: Duration) -> Result<Self> {
        if processing > catch_late {
            bail!(
                "delay processing ({}s) must not exceed catch_late ({}s)",
                processing.as_secs_f64(),
                catch_late.as_secs_f64()
            );
        }
        if catch_late > stop_checking {
            bail!(
                "delay catch_late ({}s) must not exceed stop_checking ({}s)",
                catch_late.as_secs_f64(),
                stop_checking.as_secs_f64()
            );
        }

        Ok(Self {
            processing,
            catch_late,
            stop_checking,
        })
    }

    pub fn from_secs(processing: u64, catch_late: u64, stop_checking: u64) -> Result<Self> {
        Self::new(
            Duration::from_secs(processing),
            Duration::from_secs(catch_late),
            Duration::from_secs(stop_checking),
        )
    }

    /// Offset at which the claimant's exclusive window opens.
    pub fn processing(&self) -> Duration {
        self.processing
    }

    /// Offset at which other operators may take over.
    pub fn catch_late(&self) -> Duration {
        self.catch_late
    }

    /// Offset after which catch-late takeover is no longer attempted.
    pub fn stop_checking(&self) -> Duration {
        self.stop_checking
    }
}

/// Order in which events inside one bucket are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchOrder {
    /// Order in which the indexer supplied the events.
    #[default]
    Encounter,
    /// Earliest due date first; ties keep encounter order.
    DueDate,
}

/// Runtime configuration for the subscription processor.
///
/// Instances are built through [`ProcessorConfig::builder`] or [`ProcessorConfig::new`],
/// both of which validate before returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    operator: OperatorId,
    delays: DelayPeriod,
    tick_interval: Duration,
    dispatch_timeout: Duration,
    metrics_interval: Duration,
    gas_limit: u64,
    gas_price: u128,
    dedup_policy: DedupPolicy,
    dispatch_order: DispatchOrder,
    catch_late_unclaimed: bool,
    breaker_failure_threshold: Option<usize>,
    breaker_cooldown: Duration,
}

pub struct ProcessorConfigParams {
    pub operator: OperatorId,
    pub delays: DelayPeriod,
    pub tick_interval: Duration,
    pub dispatch_timeout: Duration,
    pub metrics_interval: Duration,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub dedup_policy: DedupPolicy,
    pub dispatch_order: DispatchOrder,
    pub catch_late_unclaimed: bool,
    /// `None` disables the ledger circuit breaker.
    pub breaker_failure_threshold: Option<usize>,
    pub breaker_cooldown: Duration,
}

impl ProcessorConfig {
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    pub fn new(params: ProcessorConfigParams) -> Result<Self> {
        let ProcessorConfigParams {
            operator,
            delays,
            tick_interval,
            dispatch_timeout,
            metrics_interval,
            gas_limit,
            gas_price,
            dedup_policy,
            dispatch_order,
            catch_late_unclaimed,
            breaker_failure_threshold,
            breaker_cooldown,
        } = params;

        let config = Self {
            operator,
            delays,
            tick_interval,
            dispatch_timeout,
            metrics_interval,
            gas_limit,
            gas_price,
            dedup_policy,
            dispatch_order,
            catch_late_unclaimed,
            breaker_failure_threshold,
            breaker_cooldown,
        };

        config.validate()?;
        Ok(config)
    }

    /// Identity this processor submits as and compares claimants against.
    pub fn operator(&self) -> &OperatorId {
        &self.operator
    }

    pub fn delays(&self) -> DelayPeriod {
        self.delays
    }

    /// Pause between the end of one tick and the start of the next.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Upper bound on a single ledger call.
    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn gas_price(&self) -> u128 {
        self.gas_price
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        self.dedup_policy
    }

    pub fn dispatch_order(&self) -> DispatchOrder {
        self.dispatch_order
    }

    /// Whether unclaimed events are eligible for catch-late takeover.
    pub fn catch_late_unclaimed(&self) -> bool {
        self.catch_late_unclaimed
    }

    /// Consecutive ledger failures that open the circuit, when the breaker is enabled.
    pub fn breaker_failure_threshold(&self) -> Option<usize> {
        self.breaker_failure_threshold
    }

    pub fn breaker_cooldown(&self) -> Duration {
        self.breaker_cooldown
    }

    /// Transaction defaults attached to every submission.
    pub fn tx_options(&self) -> TxOptions {
        TxOptions::new(self.operator.clone(), self.gas_limit, self.gas_price)
    }

    pub fn validate(&self) -> Result<()> {
        if self.operator.is_empty() {
            bail!("operator cannot be empty");
        }

        if self.tick_interval.is_zero() {
            bail!("tick_interval must be greater than 0");
        }

        if self.dispatch_timeout.is_zero() {
            bail!("dispatch_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.gas_limit == 0 {
            bail!("gas_limit must be greater than 0");
        }

        if self.breaker_failure_threshold == Some(0) {
            bail!("breaker_failure_threshold must be greater than 0");
        }

        if self.breaker_cooldown.is_zero() {
            bail!("breaker_cooldown must be greater than 0");
        }

        if let DedupPolicy::RetryFailed { max_attempts } = self.dedup_policy {
            if max_attempts == 0 {
                bail!("dedup_policy max_attempts must be greater than 0");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProcessorConfigBuilder {
    operator: Option<OperatorId>,
    delays: Option<DelayPeriod>,
    tick_interval: Option<Duration>,
    dispatch_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    gas_limit: Option<u64>,
    gas_price: Option<u128>,
    dedup_policy: Option<DedupPolicy>,
    dispatch_order: Option<DispatchOrder>,
    catch_late_unclaimed: Option<bool>,
    breaker_failure_threshold: Option<usize>,
    breaker_cooldown: Option<Duration>,
}

impl ProcessorConfigBuilder {
    pub fn operator(mut self, operator: impl Into<OperatorId>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn delays(mut self, delays: DelayPeriod) -> Self {
        self.delays = Some(delays);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup_policy = Some(policy);
        self
    }

    pub fn dispatch_order(mut self, order: DispatchOrder) -> Self {
        self.dispatch_order = Some(order);
        self
    }

    pub fn catch_late_unclaimed(mut self, enabled: bool) -> Self {
        self.catch_late_unclaimed = Some(enabled);
        self
    }

    /// Enables the ledger circuit breaker, opening after `threshold` consecutive failures.
    pub fn breaker_failure_threshold(mut self, threshold: usize) -> Self {
        self.breaker_failure_threshold = Some(threshold);
        self
    }

    pub fn breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = Some(cooldown);
        self
    }

    pub fn build(self) -> Result<ProcessorConfig> {
        let params = ProcessorConfigParams {
            operator: self.operator.context("operator is required")?,
            delays: self.delays.context("delays are required")?,
            tick_interval: self
                .tick_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_TICK_INTERVAL_MS)),
            dispatch_timeout: self
                .dispatch_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_DISPATCH_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            gas_limit: self.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
            gas_price: self.gas_price.unwrap_or(DEFAULT_GAS_PRICE),
            dedup_policy: self.dedup_policy.unwrap_or_default(),
            dispatch_order: self.dispatch_order.unwrap_or_default(),
            catch_late_unclaimed: self.catch_late_unclaimed.unwrap_or(false),
            breaker_failure_threshold: self.breaker_failure_threshold,
            breaker_cooldown: self.breaker_cooldown.unwrap_or(DEFAULT_COOLDOWN),
        };

        ProcessorConfig::new(params)
    }
}
