//! Domain model for user management.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep caller inputs (candidate, patch) separate from the persisted shape.
//!
//! # Invariants
//! - Every persisted user is identified by a store-assigned `UserId`.
//! - There is no delete lifecycle; users live as long as the store does.

pub mod user;
