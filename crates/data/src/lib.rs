//! Data shaping and storage for the TWS tools.
//!
//! This crate provides:
//! - A column-named table with split-orient JSON and CSV I/O
//! - A key-value store seam with `PostgreSQL` and in-memory backends
//! - Snapshot upload of CSV files
//! - The modeling database exchanged with the optimizer

pub mod model_db;
pub mod pg_store;
pub mod store;
pub mod table;
pub mod upload;

pub use model_db::{ModelDatabase, VariableRecord, VariableSymbol};
pub use pg_store::PgKeyValueStore;
pub use store::{Item, ItemKey, KeyValueStore, MemoryStore, StoreError};
pub use table::{maybe_number, number, Cell, Table};
pub use upload::{dtg, snapshot_item, upload_csv};
