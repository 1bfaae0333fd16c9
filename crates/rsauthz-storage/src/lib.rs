//! rsauthz-storage: Storage abstraction layer
//!
//! This crate provides the storage abstraction for rsauthz, including:
//! - DataStore trait for schema, tuple and attribute storage
//! - In-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-storage                │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DataStore trait definition   │
//! │  memory.rs   - In-memory implementation     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{DataStore, StoredAttribute, StoredSchema, StoredTuple, TupleFilter};
