use crate::registry::OperatorId;
use serde::Serialize;

/// Default gas budget attached to every submission (about 6.7 million gas).
pub const DEFAULT_GAS_LIMIT: u64 = 6_712_390;
/// Default gas price in wei (6 gwei).
pub const DEFAULT_GAS_PRICE: u128 = 6_000_000_000;

/// Fixed transaction defaults supplied with every ledger operation.
///
/// Built once from the processor configuration and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOptions {
    pub sender: OperatorId,
    pub gas_limit: u64,
    pub gas_price: u128,
}

impl TxOptions {
    pub fn new(sender: OperatorId, gas_limit: u64, gas_price: u128) -> Self {
        Self {
            sender,
            gas_limit,
            gas_price,
        }
    }

    pub fn with_defaults(sender: OperatorId) -> Self {
        Self::new(sender, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE)
    }
}
