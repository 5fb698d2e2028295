//! # enrollhub-entity
//!
//! Domain entity models for EnrollHub. Every struct in this crate
//! represents a stored row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, and `Deserialize`.

pub mod allocation;
pub mod consumer;
pub mod ledger;
pub mod resource;
