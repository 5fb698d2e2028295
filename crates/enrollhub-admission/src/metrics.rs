//! Admission outcome counters and latency percentiles.
//!
//! Counters are atomics; latency samples sit behind a mutex and only
//! the most recent ones are kept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, FailureClass};
use crate::lease::LeasePoolStatus;
use crate::lock::LockMetricsSnapshot;

/// Maximum number of latency samples kept in memory.
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Admission and cancellation counters.
#[derive(Debug)]
pub struct AdmissionMetrics {
    attempted: AtomicU64,
    admitted: AtomicU64,
    rejected: AtomicU64,
    not_found: AtomicU64,
    busy: AtomicU64,
    timeouts: AtomicU64,
    deadlocks: AtomicU64,
    internal: AtomicU64,
    retries: AtomicU64,
    cancellations: AtomicU64,
    cancel_failures: AtomicU64,
    latency_samples: Mutex<Vec<Duration>>,
}

impl AdmissionMetrics {
    /// Create a zeroed collector.
    pub fn new() -> Self {
        Self {
            attempted: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            deadlocks: AtomicU64::new(0),
            internal: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            cancel_failures: AtomicU64::new(0),
            latency_samples: Mutex::new(Vec::with_capacity(MAX_LATENCY_SAMPLES)),
        }
    }

    /// Record the outcome of one admission attempt.
    pub fn record_admission(&self, outcome: Result<(), &AdmissionError>, elapsed: Duration) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => self.record_failure(err),
        }
        self.add_latency_sample(elapsed);
    }

    /// Record the outcome of one cancellation.
    pub fn record_cancellation(&self, outcome: Result<(), &AdmissionError>) {
        match outcome {
            Ok(()) => {
                self.cancellations.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.cancel_failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure(err);
            }
        }
    }

    /// Record a retry after a contention failure.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, err: &AdmissionError) {
        let counter = match err {
            AdmissionError::Busy { .. } => &self.busy,
            AdmissionError::Timeout { .. } => &self.timeouts,
            AdmissionError::DeadlockAborted { .. } => &self.deadlocks,
            other => match other.class() {
                FailureClass::NotFound => &self.not_found,
                FailureClass::Fatal => &self.internal,
                _ => &self.rejected,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add_latency_sample(&self, elapsed: Duration) {
        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() >= MAX_LATENCY_SAMPLES {
                samples.remove(0);
            }
            samples.push(elapsed);
        }
    }

    /// Current counters and percentiles.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self
            .latency_samples
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        let (p50, p95, p99) = percentiles(&samples);

        MetricsSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            deadlocks: self.deadlocks.load(Ordering::Relaxed),
            internal: self.internal.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            cancel_failures: self.cancel_failures.load(Ordering::Relaxed),
            latency_p50: p50,
            latency_p95: p95,
            latency_p99: p99,
            sample_count: samples.len() as u64,
        }
    }
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// P50/P95/P99 of `samples`.
pub fn percentiles(samples: &[Duration]) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
    if samples.is_empty() {
        return (None, None, None);
    }

    let mut sorted = samples.to_vec();
    sorted.sort();
    let len = sorted.len();

    let p50 = sorted.get(len * 50 / 100).copied();
    let p95 = sorted.get(len * 95 / 100).copied();
    let p99 = sorted.get(len.saturating_sub(1) * 99 / 100).copied();
    (p50, p95, p99)
}

/// Point-in-time admission counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Admission attempts.
    pub attempted: u64,
    /// Successful admissions.
    pub admitted: u64,
    /// Business-rule rejections.
    pub rejected: u64,
    /// Unknown consumer, resource, or allocation.
    pub not_found: u64,
    /// Lease pool exhaustion.
    pub busy: u64,
    /// Lock timeouts.
    pub timeouts: u64,
    /// Deadlock aborts.
    pub deadlocks: u64,
    /// Internal failures.
    pub internal: u64,
    /// Retries issued by `admit_with_retry`.
    pub retries: u64,
    /// Successful cancellations.
    pub cancellations: u64,
    /// Failed cancellations.
    pub cancel_failures: u64,
    /// Median admission latency.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub latency_p50: Option<Duration>,
    /// 95th percentile admission latency.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub latency_p95: Option<Duration>,
    /// 99th percentile admission latency.
    #[serde(
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub latency_p99: Option<Duration>,
    /// Number of latency samples.
    pub sample_count: u64,
}

/// Everything the service reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Admission outcomes.
    pub admission: MetricsSnapshot,
    /// Lock contention.
    pub locks: LockMetricsSnapshot,
    /// Lease pool occupancy.
    pub lease_pool: LeasePoolStatus,
}

/// Serialize an optional Duration as milliseconds.
fn serialize_opt_duration<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match duration {
        Some(d) => serializer.serialize_some(&(d.as_micros() as f64 / 1000.0)),
        None => serializer.serialize_none(),
    }
}

/// Deserialize an optional Duration from milliseconds.
fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis: Option<f64> = Deserialize::deserialize(deserializer)?;
    Ok(millis
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| Duration::from_micros((ms * 1000.0).round() as u64)))
}
