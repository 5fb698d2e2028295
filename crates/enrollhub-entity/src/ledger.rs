//! Credit ledger entries.

use serde::{Deserialize, Serialize};

use enrollhub_core::types::{ConsumerId, Credits, TermKey};

/// Sum of credit weight a consumer holds through active allocations in one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Consumer identifier.
    pub consumer_id: ConsumerId,
    /// Term the sum applies to.
    pub term: TermKey,
    /// Credits currently held.
    pub credits: Credits,
}
