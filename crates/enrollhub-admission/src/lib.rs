//! # enrollhub-admission
//!
//! Admission control for EnrollHub. Admits consumers to capacity-bounded
//! resources under per-entity locks, enforcing eligibility, duplicate,
//! retake, quota, and capacity rules atomically, and reverses admissions
//! through cancellation.
//!
//! The [`service::AdmissionService`] is the entry point. It owns the
//! resource store, the allocation table, the credit ledger, the lock
//! manager, and the lease pool, and consults the catalog and directory
//! collaborators fresh inside every transaction.

pub mod bootstrap;
pub mod cancel;
pub mod collaborator;
pub mod context;
pub mod error;
pub mod lease;
pub mod ledger;
pub mod lock;
pub mod metrics;
pub mod reconciler;
pub mod retry;
pub mod service;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod testing;

pub use cancel::Cancellation;
pub use error::{AdmissionError, FailureClass};
pub use service::AdmissionService;
pub use transaction::Admission;
