//! Receive side: configuration, handler registry, and the connection
//! lifecycle state machine.

mod config;
mod connection;
mod handlers;

pub use config::{InactiveBehavior, ReceiverConfig, RequestedChannel};
pub use connection::{Receiver, ReceiverHandle};
pub use handlers::Handlers;
