pub mod delivery;
pub mod email;
pub mod order;
