pub mod order_management;
