//! Pulse cache layer.
//!
//! Everything here is a derived, time-bounded view over Postgres:
//!
//! - **KV adapter** ([`KvStore`]): Redis in production, [`MemoryKvStore`] for
//!   single-node runs and tests.
//! - **Read-through helper** ([`read_through`]): cache miss, store read,
//!   cache populate, return.
//! - **Tag index** ([`TagIndex`]): immutable snapshot swapped wholesale on sync.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379"
//! counter_ttl_seconds = 86400
//! follower_ttl_seconds = 60
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
mod kv;
mod lock;
mod memory;
mod read_through;
mod redis;
mod tag_index;

pub use config::{CacheBackend, CacheConfig};
pub use keys::KeySpace;
pub use kv::{KvError, KvStore};
pub use memory::MemoryKvStore;
pub use read_through::{ReadThroughError, read_through};
pub use redis::RedisKvStore;
pub use tag_index::TagIndex;

pub(crate) use lock::{rw_read, rw_write};
