//! Signaling and mutual-exclusion primitives.

pub mod event;
pub mod mutex;

pub use event::Event;
pub use mutex::{Mutex, MutexGuard};
