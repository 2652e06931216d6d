pub mod driver_location;
pub mod order;
