//! Allocation entities.

pub mod model;
pub mod status;

pub use model::{Allocation, NewAllocation};
pub use status::AllocationStatus;
