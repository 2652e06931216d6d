use compact_str::CompactString;
use deadpool_lapin::{Manager, Pool};
use kanau::message::MessageSer;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, ConnectionProperties, ExchangeKind};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmqpExchangeType {
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl From<AmqpExchangeType> for ExchangeKind {
    fn from(value: AmqpExchangeType) -> Self {
        match value {
            AmqpExchangeType::Direct => ExchangeKind::Direct,
            AmqpExchangeType::Fanout => ExchangeKind::Fanout,
            AmqpExchangeType::Topic => ExchangeKind::Topic,
            AmqpExchangeType::Headers => ExchangeKind::Headers,
        }
    }
}

#[derive(Clone)]
pub struct AmqpPool {
    pool: Pool,
}

impl AmqpPool {
    pub fn new(url: &str, max_size: usize) -> Result<Self, Error> {
        let manager = Manager::new(url, ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| Error::BusinessPanic(anyhow::anyhow!("amqp pool build: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn channel(&self) -> Result<lapin::Channel, Error> {
        let connection = self.pool.get().await?;
        Ok(connection.create_channel().await?)
    }
}

/// Declares the exchange idempotently and publishes one message.
pub async fn publish_raw(
    pool: &AmqpPool,
    exchange: &str,
    exchange_type: AmqpExchangeType,
    routing_key: &str,
    payload: &[u8],
) -> Result<(), Error> {
    let channel = pool.channel().await?;
    channel
        .exchange_declare(
            exchange,
            exchange_type.into(),
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .basic_publish(
            exchange,
            routing_key,
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default(),
        )
        .await?
        .await?;
    Ok(())
}

pub trait AmqpRouting {
    const EXCHANGE: &'static str;
    const EXCHANGE_TYPE: AmqpExchangeType;
    const ROUTING_KEY: &'static str;

    /// Per-message routing key. Defaults to the static one; messages scoped
    /// to a single order override this.
    fn routing_key(&self) -> CompactString {
        CompactString::const_new(Self::ROUTING_KEY)
    }
}

pub trait AmqpMessageSend: AmqpRouting + MessageSer + Send + Sized {
    fn send(self, pool: &AmqpPool) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            let routing_key = self.routing_key();
            let payload = self
                .to_bytes()
                .map_err(|e| Error::SerializeError(e.into().into()))?;
            publish_raw(
                pool,
                Self::EXCHANGE,
                Self::EXCHANGE_TYPE,
                routing_key.as_str(),
                payload.as_ref(),
            )
            .await
        }
    }
}
