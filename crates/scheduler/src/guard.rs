//! Start guard: at most one run start per date key.
//!
//! Uses Redis `SET NX EX` so that two scheduler processes firing for the same
//! day cannot both start a run.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use courier_common::types::DateKey;

/// How long a date key stays claimed (longer than a day plus a run's window).
pub const GUARD_TTL_SECS: u64 = 36 * 60 * 60;

#[async_trait]
pub trait StartGuard: Send + Sync {
    /// Claim `date_key`. Returns `false` if it was already claimed.
    async fn try_acquire(&self, date_key: DateKey) -> anyhow::Result<bool>;

    /// Give up a claim whose run never started.
    async fn release(&self, date_key: DateKey) -> anyhow::Result<()>;
}

pub struct RedisStartGuard {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisStartGuard {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            ttl_secs: GUARD_TTL_SECS,
        }
    }

    pub fn key(date_key: DateKey) -> String {
        format!("courier:trigger:{}", date_key)
    }
}

#[async_trait]
impl StartGuard for RedisStartGuard {
    async fn try_acquire(&self, date_key: DateKey) -> anyhow::Result<bool> {
        let mut redis = self.redis.clone();

        // Some("OK") if the key was set, None if another start holds it.
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::key(date_key))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut redis)
            .await?;

        Ok(result.is_some())
    }

    async fn release(&self, date_key: DateKey) -> anyhow::Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis::cmd("DEL")
            .arg(Self::key(date_key))
            .query_async(&mut redis)
            .await?;
        Ok(())
    }
}
