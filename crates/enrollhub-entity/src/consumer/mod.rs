//! Consumer entities as reported by the directory.

pub mod model;
pub mod status;

pub use model::Consumer;
pub use status::{CourseOutcome, Eligibility, QuotaTier};
