//! Core building blocks for the Kestrel key-value server.
//!
//! This crate is fully synchronous and contains:
//! - `resp` - the wire protocol codec (streaming parser and encoder)
//! - `store` - the in-memory storage engine with TTL and eviction
//! - `store::aol` - the append-only log used for durability and replay
//! - `error` - shared error types

pub mod error;
pub mod resp;
pub mod store;
