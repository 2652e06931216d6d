use compact_str::{CompactString, format_compact};
use uuid::Uuid;

use crate::entities::driver_location::{DeliveryStatus, DriverLocation};

/// Full-row location payload for the customer tracking channel.
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
pub struct LocationSnapshot {
    pub order_id: Uuid,
    pub tracking_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: DeliveryStatus,
    pub updated_at: i64,
}

impl From<&DriverLocation> for LocationSnapshot {
    fn from(row: &DriverLocation) -> Self {
        Self {
            order_id: row.order_id,
            tracking_code: row.tracking_code.clone(),
            latitude: row.latitude,
            longitude: row.longitude,
            status: row.status,
            updated_at: row.updated_at.assume_utc().unix_timestamp(),
        }
    }
}

impl LocationSnapshot {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
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
pub struct DriverLocationChangedEvent {
    pub location: LocationSnapshot,
}

impl framework::rabbitmq::AmqpRouting for DriverLocationChangedEvent {
    const EXCHANGE: &'static str = "tracking";
    const EXCHANGE_TYPE: framework::rabbitmq::AmqpExchangeType =
        framework::rabbitmq::AmqpExchangeType::Direct;
    const ROUTING_KEY: &'static str = "location";

    fn routing_key(&self) -> CompactString {
        location_routing_key(&self.location.tracking_code)
    }
}

impl framework::rabbitmq::AmqpMessageSend for DriverLocationChangedEvent {}

pub fn location_routing_key(tracking_code: &str) -> CompactString {
    format_compact!("location.{tracking_code}")
}
