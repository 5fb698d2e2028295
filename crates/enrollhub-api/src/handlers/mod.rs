//! Request handlers grouped by resource.

pub mod admin;
pub mod consumer;
pub mod enrollment;
pub mod health;
pub mod resource;
