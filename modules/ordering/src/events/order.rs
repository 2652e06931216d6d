use compact_str::{CompactString, format_compact};
use uuid::Uuid;

use crate::entities::order::{Order, OrderStatus};

/// Full-row order payload pushed to the customer tracking channel. Events
/// replace the subscriber's snapshot wholesale, so the payload is the row,
/// not a diff. Driver credentials never leave the database.
#[derive(
    Debug,
    Clone,
    PartialEq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    kanau::RkyvMessageSer,
    kanau::RkyvMessageDe,
)]
pub struct OrderSnapshot {
    pub order_id: Uuid,
    pub tracking_code: String,
    pub order_status: OrderStatus,
    pub full_name: String,
    pub city: String,
    pub governorate: String,
    pub driver_name: Option<String>,
    pub delivered_at: Option<i64>,
    pub delivery_photo_url: Option<String>,
}

impl OrderSnapshot {
    /// `None` until the order has a tracking code: the push channel is keyed
    /// by tracking code, so earlier states have nowhere to be routed.
    pub fn of_order(order: &Order) -> Option<Self> {
        let tracking_code = order.tracking_code.clone()?;
        Some(Self {
            order_id: order.id,
            tracking_code,
            order_status: order.order_status,
            full_name: order.full_name.clone(),
            city: order.city.clone(),
            governorate: order.governorate.clone(),
            driver_name: order.driver_name.clone(),
            delivered_at: order.delivered_at.map(|t| t.assume_utc().unix_timestamp()),
            delivery_photo_url: order.delivery_photo_url.clone(),
        })
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    kanau::RkyvMessageSer,
    kanau::RkyvMessageDe,
)]
pub struct OrderStatusChangedEvent {
    pub order: OrderSnapshot,
    pub changed_at: i64,
}

impl framework::rabbitmq::AmqpRouting for OrderStatusChangedEvent {
    const EXCHANGE: &'static str = "tracking";
    const EXCHANGE_TYPE: framework::rabbitmq::AmqpExchangeType =
        framework::rabbitmq::AmqpExchangeType::Direct;
    const ROUTING_KEY: &'static str = "order";

    fn routing_key(&self) -> CompactString {
        order_routing_key(&self.order.tracking_code)
    }
}

impl framework::rabbitmq::AmqpMessageSend for OrderStatusChangedEvent {}

pub fn order_routing_key(tracking_code: &str) -> CompactString {
    format_compact!("order.{tracking_code}")
}
