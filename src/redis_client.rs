use redis::aio::ConnectionManager;
use redis::RedisResult;

/// Creates a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// multiplexed TCP connection. Used by the report loader. Sinks keep
/// their own blocking connection.
pub async fn connect(url: &str) -> RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}
