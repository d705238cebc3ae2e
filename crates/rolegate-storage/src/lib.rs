//! rolegate-storage: Storage abstraction layer
//!
//! This crate provides the persistence collaborator for rolegate, including:
//! - DataStore trait for row-oriented storage operations
//! - In-memory implementation for testing and single-process use
//! - In-memory permission source
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              rolegate-storage                │
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
pub use memory::{MemoryDataStore, MemoryPermissionSource};
pub use traits::{DataStore, Row};
