//! Shared sliding-window store on Redis.
//!
//! Each identifier is a sorted set of request timestamps. Purge, count and
//! append run inside one Lua script, so checks from every gateway instance
//! are atomic against each other.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;

use super::{RateLimitBackend, RateLimitError, WindowOutcome};
use crate::config::WindowPolicy;

const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', key, window)

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_ms = now
if oldest[2] then
    oldest_ms = tonumber(oldest[2])
end
return {allowed, count, oldest_ms}
";

#[derive(Clone)]
pub struct RedisBackend {
    connection: ConnectionManager,
    script: redis::Script,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self, RateLimitError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            script: redis::Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimitBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn record(
        &self,
        key: &str,
        now_ms: i64,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, RateLimitError> {
        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4().simple());
        let mut conn = self.connection.clone();

        let reply: Vec<i64> = self
            .script
            .key(key)
            .arg(now_ms)
            .arg(policy.window().as_millis() as i64)
            .arg(policy.max_requests)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        match reply.as_slice() {
            [allowed, count, oldest_ms] => Ok(WindowOutcome {
                allowed: *allowed == 1,
                count: (*count).max(0) as u32,
                oldest_ms: *oldest_ms,
            }),
            other => Err(RateLimitError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}
