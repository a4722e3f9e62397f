//! Data models
//!
//! Shared between the remote client and the reconciler.
//! Declared types use snake_case (caller state files); wire types use camelCase.

pub mod deployment;
pub mod worker_queue;

// Re-exports
pub use deployment::*;
pub use worker_queue::*;
