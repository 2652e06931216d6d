#![forbid(unsafe_code, clippy::unwrap_used, clippy::panic, clippy::expect_used)]

pub mod driver_session;
pub mod location_publisher;
pub mod photo;
pub mod position;
pub mod tracking_subscriber;
