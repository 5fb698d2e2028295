//! Core type definitions used across the EnrollHub workspace.

pub mod credits;
pub mod id;
pub mod term;

pub use credits::Credits;
pub use id::*;
pub use term::{Season, TermKey};
