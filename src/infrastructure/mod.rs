//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements the persistence ports and wires up services.

pub mod catalog;
pub mod di;
pub mod error;
pub mod memory;
pub mod traits;

pub use catalog::{load_catalog, load_progress, Catalog, ProgressSnapshot, SnapshotFile};
pub use error::{InfraError, InfraResult};
pub use memory::InMemoryStore;
