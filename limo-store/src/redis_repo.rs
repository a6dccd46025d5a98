use async_trait::async_trait;
use limo_core::repository::SessionStore;
use limo_core::StoreError;
use redis::{AsyncCommands, RedisResult};
use tracing::debug;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await
    }

    pub async fn blacklist_exists(&self, token: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = format!("blacklist:{}", token);
        conn.exists(key).await
    }

    /// Counts a hit in the fixed window stored at `key`. The first hit opens
    /// the window and sets its expiry; later hits leave the expiry alone.
    pub async fn incr_window(&self, key: &str, window_seconds: i64) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // EXPIRE ... NX needs Redis 7.
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_seconds)
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}

fn session_error(err: redis::RedisError) -> StoreError {
    StoreError::Session(err.to_string())
}

#[async_trait]
impl SessionStore for RedisClient {
    async fn is_token_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        self.blacklist_exists(token).await.map_err(session_error)
    }

    async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<bool, StoreError> {
        let count = self.incr_window(key, window_seconds).await.map_err(session_error)?;
        debug!("Rate limit window {}: {}/{}", key, count, limit);
        Ok(count <= limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Requires a running Redis 7: docker run -d -p 6379:6379 redis:7-alpine

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_window_expiry_is_not_extended_by_hits() {
        let client = RedisClient::new("redis://127.0.0.1:6379").unwrap();
        let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());

        assert_eq!(client.incr_window(&key, 60).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(client.incr_window(&key, 60).await.unwrap(), 2);

        let mut conn = client.client.get_multiplexed_async_connection().await.unwrap();
        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!(ttl > 0 && ttl < 60, "window expiry was reset: ttl {}", ttl);

        let _: () = conn.del(&key).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn test_window_resets_after_expiry() {
        let client = RedisClient::new("redis://127.0.0.1:6379").unwrap();
        let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());

        assert!(client.check_rate_limit(&key, 1, 1).await.unwrap());
        assert!(!client.check_rate_limit(&key, 1, 1).await.unwrap());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(client.check_rate_limit(&key, 1, 1).await.unwrap());
    }
}
