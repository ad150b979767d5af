//! watchpool Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Persistence
//! - Runtime specifics
//!
//! All types here describe watch tasks, the pools that serve them, and
//! the records that mirror pool state into durable storage.

pub mod error;
pub mod ids;
pub mod locator;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{PoolKey, TaskId, WorkerId};
pub use locator::ResourceLocator;
pub use status::{PoolStatus, TaskStatus};
pub use task::{NewTaskRecord, TaskRecord};
