use framework::Error;
use framework::rabbitmq::{AmqpMessageSend, AmqpPool, AmqpRouting};
use kanau::message::MessageDe;
use lapin::options::{
    BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::events::delivery::{location_routing_key, DriverLocationChangedEvent, LocationSnapshot};
use crate::events::email::OrderEmailSendCall;
use crate::events::order::{order_routing_key, OrderSnapshot, OrderStatusChangedEvent};

/// One event on a customer's tracking channel. Two independent streams share
/// the channel; each carries the full new row.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    Order(OrderSnapshot),
    Location(LocationSnapshot),
}

/// Push-channel contract of the tracking core: publish order/location row
/// changes, fire customer email calls, and subscribe to one order's channel
/// by tracking code.
pub trait TrackingChannel: Clone + Send + Sync + 'static {
    fn publish_order_changed(
        &self,
        event: OrderStatusChangedEvent,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn publish_location_changed(
        &self,
        event: DriverLocationChangedEvent,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn send_order_email(
        &self,
        call: OrderEmailSendCall,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn subscribe(
        &self,
        tracking_code: &str,
    ) -> impl Future<Output = Result<TrackingFeed, Error>> + Send;
}

/// Live event feed for one tracking code. Dropping the feed tears the
/// subscription down; the customer view owns exactly one of these for its
/// whole lifetime and never longer.
pub struct TrackingFeed {
    rx: mpsc::Receiver<TrackingEvent>,
    _pump: Option<PumpGuard>,
}

struct PumpGuard(JoinHandle<()>);

impl Drop for PumpGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl TrackingFeed {
    pub fn new(rx: mpsc::Receiver<TrackingEvent>) -> Self {
        Self { rx, _pump: None }
    }

    pub fn with_pump(rx: mpsc::Receiver<TrackingEvent>, pump: JoinHandle<()>) -> Self {
        Self {
            rx,
            _pump: Some(PumpGuard(pump)),
        }
    }

    pub async fn next_event(&mut self) -> Option<TrackingEvent> {
        self.rx.recv().await
    }
}

/// Production channel over RabbitMQ: a direct exchange with per-order
/// routing keys, one exclusive auto-delete queue per subscriber.
#[derive(Clone)]
pub struct AmqpTrackingChannel {
    pub mq: AmqpPool,
}

const FEED_BUFFER: usize = 16;

impl TrackingChannel for AmqpTrackingChannel {
    async fn publish_order_changed(&self, event: OrderStatusChangedEvent) -> Result<(), Error> {
        event.send(&self.mq).await
    }

    async fn publish_location_changed(
        &self,
        event: DriverLocationChangedEvent,
    ) -> Result<(), Error> {
        event.send(&self.mq).await
    }

    async fn send_order_email(&self, call: OrderEmailSendCall) -> Result<(), Error> {
        call.send(&self.mq).await
    }

    async fn subscribe(&self, tracking_code: &str) -> Result<TrackingFeed, Error> {
        let channel = self.mq.channel().await?;
        channel
            .exchange_declare(
                OrderStatusChangedEvent::EXCHANGE,
                OrderStatusChangedEvent::EXCHANGE_TYPE.into(),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        for key in [
            order_routing_key(tracking_code),
            location_routing_key(tracking_code),
        ] {
            channel
                .queue_bind(
                    queue.name().as_str(),
                    OrderStatusChangedEvent::EXCHANGE,
                    key.as_str(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        let mut consumer = channel
            .basic_consume(
                queue.name().as_str(),
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let pump = tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        warn!("tracking feed consumer error: {e}");
                        break;
                    }
                };
                let Some(event) = decode_event(delivery.routing_key.as_str(), &delivery.data)
                else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(TrackingFeed::with_pump(rx, pump))
    }
}

fn decode_event(routing_key: &str, payload: &[u8]) -> Option<TrackingEvent> {
    if routing_key.starts_with("order.") {
        match OrderStatusChangedEvent::from_bytes(payload) {
            Ok(event) => return Some(TrackingEvent::Order(event.order)),
            Err(e) => warn!("undecodable order event on {routing_key}: {e}"),
        }
    } else if routing_key.starts_with("location.") {
        match DriverLocationChangedEvent::from_bytes(payload) {
            Ok(event) => return Some(TrackingEvent::Location(event.location)),
            Err(e) => warn!("undecodable location event on {routing_key}: {e}"),
        }
    }
    None
}
