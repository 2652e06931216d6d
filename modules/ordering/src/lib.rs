#![forbid(unsafe_code, clippy::unwrap_used, clippy::panic, clippy::expect_used)]

pub mod channel;
pub mod codes;
pub mod config;
pub mod entities;
pub mod events;
pub mod store;

#[cfg(feature = "testkit")]
pub mod testkit;
