//! # Silo Storage
//!
//! Read interface over the organization auth configuration owned by the
//! credential silo.
//!
//! Provides the [`AuthConfigStore`] trait, its error type and an in-memory
//! implementation used for development and tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod store;

pub use error::StorageError;
pub use memory::MemoryAuthConfigStore;
pub use store::AuthConfigStore;
