//! Redis KV backend.
//!
//! Compound operations run as Lua scripts so each one is a single atomic
//! step on the server, shared by every process behind the same Redis.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};

use super::kv::{KvError, KvStore, ttl_millis};

const INCR_IF_PRESENT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('INCRBY', KEYS[1], ARGV[1])
end
return false
"#;

const INCR_OR_INIT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('INCRBY', KEYS[1], ARGV[2])
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[3])
return redis.call('INCRBY', KEYS[1], ARGV[2])
"#;

const COMPARE_AND_SWAP: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= ARGV[2] then return 0 end
elseif current then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3], 'PX', ARGV[4])
return 1
"#;

#[derive(Clone)]
pub struct RedisKvStore {
    manager: ConnectionManager,
    incr_if_present: Script,
    incr_or_init: Script,
    compare_and_swap: Script,
}

fn unavailable(err: RedisError) -> KvError {
    KvError::unavailable(err)
}

impl RedisKvStore {
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::from_manager(manager))
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            incr_if_present: Script::new(INCR_IF_PRESENT),
            incr_or_init: Script::new(INCR_OR_INIT),
            compare_and_swap: Script::new(COMPARE_AND_SWAP),
        }
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    fn supports_atomic_incr(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(updated == 1)
    }

    async fn incr_if_present(&self, key: &str, delta: i64) -> Result<Option<i64>, KvError> {
        let mut conn = self.manager.clone();
        self.incr_if_present
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn incr_or_init(
        &self,
        key: &str,
        init: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, KvError> {
        let mut conn = self.manager.clone();
        self.incr_or_init
            .key(key)
            .arg(init)
            .arg(delta)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let mut conn = self.manager.clone();
        let (has_expected, expected) = match expected {
            Some(value) => ("1", value),
            None => ("0", ""),
        };
        let swapped: i64 = self
            .compare_and_swap
            .key(key)
            .arg(has_expected)
            .arg(expected)
            .arg(new)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(swapped == 1)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
