//! State store implementations.
//!
//! Available backends:
//! - `MemoryStateStore` - in-memory (tests, dry runs)
//! - `SqliteStateStore` - single SQLite file
//!
//! Either can be exported to / imported from a JSON snapshot.

pub mod memory;
pub mod snapshot;
pub mod sqlite;

pub use memory::MemoryStateStore;
pub use snapshot::{export_snapshot, import_snapshot, read_snapshot, StateSnapshot};
pub use sqlite::SqliteStateStore;
