//! Wire and value types exchanged between the transport layer, the task
//! manager, and plugins.
//!
//! Record-level types with persistence concerns live in
//! [`domain`](crate::domain).

pub mod execution;
pub mod notification;
pub mod request;
pub mod status;

pub use execution::*;
pub use notification::*;
pub use request::*;
pub use status::*;
