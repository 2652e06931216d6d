use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(
    Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize,
)]
pub enum OrderEmailKind {
    /// Sent on every successful status transition.
    StatusChanged(OrderStatus),
    /// Operator re-sends the customer tracking link.
    TrackingLink,
}

/// Request for the email worker. Delivery of the mail itself is an external
/// collaborator; the tracking core fires this and never waits on it.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    kanau::RkyvMessageSer,
    kanau::RkyvMessageDe,
)]
pub struct OrderEmailSendCall {
    pub order_id: Uuid,
    pub customer_email: String,
    pub customer_name: String,
    pub kind: OrderEmailKind,
    pub tracking_url: Option<String>,
    pub sent_at: i64,
}

impl framework::rabbitmq::AmqpRouting for OrderEmailSendCall {
    const EXCHANGE: &'static str = "notification";
    const EXCHANGE_TYPE: framework::rabbitmq::AmqpExchangeType =
        framework::rabbitmq::AmqpExchangeType::Direct;
    const ROUTING_KEY: &'static str = "order_email";
}

impl framework::rabbitmq::AmqpMessageSend for OrderEmailSendCall {}
