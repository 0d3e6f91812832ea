pub mod helpers;
pub mod recording_ledger;
