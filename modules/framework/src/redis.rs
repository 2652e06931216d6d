pub type RedisConnection = redis::aio::ConnectionManager;

pub async fn connect_redis(url: &str) -> Result<RedisConnection, crate::Error> {
    let client = redis::Client::open(url)?;
    let manager = redis::aio::ConnectionManager::new(client).await?;
    Ok(manager)
}
