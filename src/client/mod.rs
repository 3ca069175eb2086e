//! Reference subscriber for the change stream.
//!
//! Embeds the reconnect and resubscribe policy clients are expected to
//! implement: exponential backoff with jitter, replay of the subscription
//! set after reconnect, and no retry after an auth-failure close.

mod stream_client;

pub use stream_client::*;

#[cfg(test)]
mod stream_client_test;
