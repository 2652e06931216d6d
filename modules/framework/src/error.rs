use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("invalid input")]
    InvalidInput,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("amqp pool error: {0}")]
    AmqpPool(#[from] deadpool_lapin::PoolError),

    #[error("serialize error: {0}")]
    SerializeError(anyhow::Error),

    #[error("deserialize error: {0}")]
    DeserializeError(anyhow::Error),

    /// An invariant the business layer relies on was broken.
    #[error("business panic: {0}")]
    BusinessPanic(anyhow::Error),
}
