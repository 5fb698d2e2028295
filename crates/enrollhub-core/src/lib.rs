//! # enrollhub-core
//!
//! Core crate for EnrollHub. Contains configuration schemas, typed
//! identifiers, fixed-point credit arithmetic, academic term keys,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other EnrollHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
