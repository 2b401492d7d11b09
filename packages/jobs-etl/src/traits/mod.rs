//! Core trait abstractions for the engine.
//!
//! The orchestrator is generic over where pages come from and where postings
//! go, so the HTTP source and the Postgres store can be swapped for the
//! in-memory implementations in tests.

pub mod source;
pub mod store;
