mod connection;
mod hub;

pub use connection::*;
pub use hub::*;
