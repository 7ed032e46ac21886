pub mod cart;
pub mod errors;
pub mod order;
pub mod ports;
pub mod redemption;
pub mod ticket_pool;
