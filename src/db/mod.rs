//! Durable client-side state: namespaced JSON records in SQLite.
//!
//! Layout:
//! - `models.rs`: row struct for a stored record
//! - `schema.rs`: SQL DDL for initializing the database
//! - `sqlite.rs`: connection setup and record operations

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::DbRecord;
pub use schema::SQLITE_INIT;
pub use sqlite::{StateStorage, SqlitePool};
