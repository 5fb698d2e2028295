//! Per consumer and term credit ledger.
//!
//! The ledger caches the sum of credit weight held through active
//! allocations. Writes for a consumer only happen under that consumer's
//! entity lock; reads outside the lock are eventually consistent.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use enrollhub_core::types::{ConsumerId, Credits, TermKey};
use enrollhub_entity::allocation::Allocation;
use enrollhub_entity::ledger::LedgerEntry;

/// Difference between the cached ledger and a recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDrift {
    /// Consumer identifier.
    pub consumer_id: ConsumerId,
    /// Term.
    pub term: TermKey,
    /// Value in the cache.
    pub cached: Credits,
    /// Value recomputed from active allocations.
    pub expected: Credits,
}

/// Running credit sums keyed by consumer and term.
#[derive(Debug, Default)]
pub struct LedgerIndex {
    entries: DashMap<(ConsumerId, TermKey), Credits>,
}

impl LedgerIndex {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits currently held by `consumer_id` in `term`.
    pub fn get(&self, consumer_id: &ConsumerId, term: TermKey) -> Credits {
        self.entries
            .get(&(consumer_id.clone(), term))
            .map(|c| *c)
            .unwrap_or(Credits::ZERO)
    }

    /// Ledger entry for `consumer_id` in `term`.
    pub fn entry(&self, consumer_id: &ConsumerId, term: TermKey) -> LedgerEntry {
        LedgerEntry {
            consumer_id: consumer_id.clone(),
            term,
            credits: self.get(consumer_id, term),
        }
    }

    /// Add `weight`, returning the new sum, or `None` on overflow with
    /// the entry left unchanged.
    pub fn add(&self, consumer_id: &ConsumerId, term: TermKey, weight: Credits) -> Option<Credits> {
        let mut entry = self
            .entries
            .entry((consumer_id.clone(), term))
            .or_insert(Credits::ZERO);
        let updated = entry.checked_add(weight)?;
        *entry = updated;
        Some(updated)
    }

    /// Subtract `weight`, clamping at zero. Returns the new sum.
    pub fn subtract(&self, consumer_id: &ConsumerId, term: TermKey, weight: Credits) -> Credits {
        let key = (consumer_id.clone(), term);
        let updated = {
            let mut entry = self.entries.entry(key.clone()).or_insert(Credits::ZERO);
            let current = *entry;
            let updated = match current.checked_sub(weight) {
                Some(v) => v,
                None => {
                    warn!(
                        consumer_id = %consumer_id,
                        term = %term,
                        current = %current,
                        weight = %weight,
                        "Ledger underflow, clamping to zero"
                    );
                    Credits::ZERO
                }
            };
            *entry = updated;
            updated
        };
        if updated.is_zero() {
            self.entries.remove_if(&key, |_, v| v.is_zero());
        }
        updated
    }

    /// Overwrite one entry.
    pub fn set(&self, consumer_id: &ConsumerId, term: TermKey, credits: Credits) {
        let key = (consumer_id.clone(), term);
        if credits.is_zero() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, credits);
        }
    }

    /// All non-zero entries, sorted by consumer then term.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut out: Vec<LedgerEntry> = self
            .entries
            .iter()
            .map(|e| LedgerEntry {
                consumer_id: e.key().0.clone(),
                term: e.key().1,
                credits: *e.value(),
            })
            .collect();
        out.sort_by(|a, b| (&a.consumer_id, a.term).cmp(&(&b.consumer_id, b.term)));
        out
    }

    /// Number of non-zero entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum active allocations per consumer and term.
    pub fn compute(allocations: &[Allocation]) -> HashMap<(ConsumerId, TermKey), Credits> {
        let mut sums: HashMap<(ConsumerId, TermKey), Credits> = HashMap::new();
        for allocation in allocations.iter().filter(|a| a.is_active()) {
            let slot = sums
                .entry((allocation.consumer_id.clone(), allocation.term))
                .or_insert(Credits::ZERO);
            *slot = [*slot, allocation.credit_weight].into_iter().sum();
        }
        sums.retain(|_, v| !v.is_zero());
        sums
    }

    /// Replace the whole ledger with a recomputation from `allocations`.
    ///
    /// Only call while no transaction is running (startup).
    pub fn rebuild(&self, allocations: &[Allocation]) {
        let sums = Self::compute(allocations);
        self.entries.clear();
        for (key, credits) in sums {
            self.entries.insert(key, credits);
        }
        info!(entries = self.entries.len(), "Ledger rebuilt from allocations");
    }

    /// Compare the cache with a recomputation from `allocations`.
    pub fn verify(&self, allocations: &[Allocation]) -> Vec<LedgerDrift> {
        let expected = Self::compute(allocations);
        let mut drifts = Vec::new();

        for ((consumer_id, term), want) in &expected {
            let cached = self.get(consumer_id, *term);
            if cached != *want {
                drifts.push(LedgerDrift {
                    consumer_id: consumer_id.clone(),
                    term: *term,
                    cached,
                    expected: *want,
                });
            }
        }

        for entry in self.entries.iter() {
            if !expected.contains_key(entry.key()) && !entry.value().is_zero() {
                drifts.push(LedgerDrift {
                    consumer_id: entry.key().0.clone(),
                    term: entry.key().1,
                    cached: *entry.value(),
                    expected: Credits::ZERO,
                });
            }
        }

        drifts.sort_by(|a, b| (&a.consumer_id, a.term).cmp(&(&b.consumer_id, b.term)));
        drifts
    }
}
