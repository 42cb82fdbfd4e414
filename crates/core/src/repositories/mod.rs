//! Repository management modules.
//!
//! File-backed storage for chat threads and their message logs.

pub mod messages;
pub(crate) mod shared;
pub mod threads;
