use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of a service operator on the ledger (an account address).
///
/// Identities are trimmed and ASCII-lowercased on construction so that
/// checksummed and lowercase spellings of the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OperatorId(String);

impl OperatorId {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperatorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for OperatorId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for OperatorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

/// A pending subscription obligation as reported by the event indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub transaction_hash: String,
    pub contract_address: String,
    pub payment_identifier: String,
    /// Seconds since the Unix epoch.
    pub due_date: u64,
    pub activated: bool,
    #[serde(default, deserialize_with = "deserialize_claimant")]
    pub claimant: Option<OperatorId>,
    #[serde(default)]
    pub cancelled: bool,
}

impl SubscriptionEvent {
    pub fn new(
        transaction_hash: impl Into<String>,
        contract_address: impl Into<String>,
        payment_identifier: impl Into<String>,
        due_date: u64,
    ) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            contract_address: contract_address.into(),
            payment_identifier: payment_identifier.into(),
            due_date,
            activated: false,
            claimant: None,
            cancelled: false,
        }
    }

    pub fn activated(mut self, activated: bool) -> Self {
        self.activated = activated;
        self
    }

    pub fn claimed_by(mut self, claimant: impl Into<OperatorId>) -> Self {
        self.claimant = Some(claimant.into());
        self
    }

    pub fn cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Due date expressed as an offset from the Unix epoch.
    pub fn due_at(&self) -> Duration {
        Duration::from_secs(self.due_date)
    }

    /// Returns true when `operator` is allowed to act inside the exclusive window.
    pub fn claimable_by(&self, operator: &OperatorId) -> bool {
        match &self.claimant {
            None => true,
            Some(claimant) => claimant == operator,
        }
    }

    /// Returns true when another operator currently holds the claim.
    pub fn claimed_by_other(&self, operator: &OperatorId) -> bool {
        matches!(&self.claimant, Some(claimant) if claimant != operator)
    }

    pub fn target(&self) -> SubscriptionTarget {
        SubscriptionTarget {
            contract_address: self.contract_address.clone(),
            payment_identifier: self.payment_identifier.clone(),
        }
    }
}

/// Identifiers handed to the ledger when submitting an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTarget {
    pub contract_address: String,
    pub payment_identifier: String,
}

// Indexers emit an empty string when nobody holds the claim.
fn deserialize_claimant<'de, D>(deserializer: D) -> Result<Option<OperatorId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(OperatorId::new)
        .filter(|operator| !operator.is_empty()))
}
