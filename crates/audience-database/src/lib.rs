//! SQLite persistence for the audience signal pipeline.
//!
//! This crate provides:
//! - `Database`: a single serialized connection with WAL mode
//! - Schema migrations tracked in a `migrations` table
//! - The `data_store` key-value table, exposed through `audience_storage::DataStore`
//! - The `signal_hits` table backing the durable hit queue
//!
//! All access goes through one mutex-guarded connection, so a `Database`
//! can be shared as `Arc<Database>` between the orchestrator and the queue
//! worker.

mod db;
mod error;
mod migrations;
mod models;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::SignalHitRecord;
