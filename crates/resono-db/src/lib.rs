//! PostgreSQL backend for the resono fingerprint store.
//!
//! Implements [`resono_core::FingerprintStore`] over the three relational
//! tables (`recordings`, `fingerprints`, `queries`) with a hash index for
//! postings lookup and a `(recording_id, time_offset)` index for
//! per-candidate scans.

mod connection;
mod models;
mod operations;
mod schema;
mod store;

pub use connection::{create_pool, test_connection, DbPool};
pub use schema::init_schema;
pub use store::PgStore;
