//! Graph persistence
//!
//! [`GraphStore`] abstracts relational backends; `SqliteStore` is the
//! implementation. [`GraphDocument`] is the JSON form written by the CLI.

mod json;
mod sqlite;
mod traits;

pub use json::{EdgeEntry, GraphDocument, GraphMetadata, NodeEntry};
pub use sqlite::SqliteStore;
pub use traits::{GraphStore, OpenStore, StorageError, StorageResult};
