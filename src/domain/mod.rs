//! Domain types for persisted task state.
//!
//! [`TaskRecord`] is the durable projection of a container: identity, outer
//! status, plugin state, configuration, and the local and global stores.

pub mod record;

pub use record::*;
