//! Storage implementations.
//!
//! Available backends:
//! - `MemoryStore` - In-memory storage for tests and dry runs
//! - `PostgresStore` - PostgreSQL storage with versioned migrations

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
