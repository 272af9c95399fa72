//! Agit-State: Embedded Persistence for Agit
//!
//! This crate provides the persistence layer for the agent version-control
//! engine: a content-addressed object store, a ref table and an append-only
//! audit log, all backed by embedded SurrealDB.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: data integrity, durability and atomic ref transitions.
//!
//! ## Key Components
//!
//! - [`ObjectStore`]: the storage contract (objects, refs, audit)
//! - [`SurrealStore`]: embedded implementation with a durable on-disk
//!   variant (`<root>/.agit/repo.db`) and an ephemeral `":memory:"` variant
//! - [`ObjectId`]: SHA-256 content address
//! - [`canonical`]: deterministic JSON encoding used for hashing

pub mod canonical;
mod error;
mod object_id;
mod store;
mod surreal;

pub use error::StateError;
pub use object_id::ObjectId;
pub use store::{now_utc_iso, AuditAction, AuditRecord, ObjectStore};
pub use surreal::{SurrealStore, MEMORY_PATH};

/// Result type for agit-state operations
pub type Result<T> = std::result::Result<T, StateError>;
