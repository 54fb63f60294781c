//! Cache-backed services sitting between HTTP handlers and storage.

pub mod counters;
pub mod error;
pub mod followers;
pub mod jobs;
pub mod repos;
pub mod tags;
pub mod trending;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
