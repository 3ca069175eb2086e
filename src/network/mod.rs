//! Subscriber-facing HTTP and WebSocket surface.
//!
//! HTTP carries point reads and writes; the WebSocket stream carries the
//! ordered change feed. One [`ConnectionManager`] owns all live sockets and
//! doubles as the notifier's event sink.

mod auth;
mod connection;
mod liveness;
mod protocol;
mod server;

pub use auth::*;
pub use connection::*;
pub use liveness::*;
pub use protocol::*;
pub use server::*;

#[cfg(test)]
mod auth_test;
#[cfg(test)]
mod connection_test;
#[cfg(test)]
mod protocol_test;
