use redis::Client;
use redis::aio::ConnectionManager;

/// Open a Redis connection manager; it reconnects on its own after drops.
pub async fn create_redis_pool(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let manager = ConnectionManager::new(Client::open(redis_url)?).await?;

    tracing::info!(redis_url, "Connected to Redis");
    Ok(manager)
}
