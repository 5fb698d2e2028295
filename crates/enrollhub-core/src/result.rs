//! Convenience result type alias for EnrollHub.

use crate::error::AppError;

/// A specialized `Result` type for EnrollHub operations.
pub type AppResult<T> = Result<T, AppError>;
