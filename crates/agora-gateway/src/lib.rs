pub mod channel;
pub mod connection;

pub use channel::DeliveryChannel;
