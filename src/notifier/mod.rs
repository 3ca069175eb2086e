//! Ordered change-event fanout.
//!
//! Every accepted reconciliation publishes exactly one [`ChangeEvent`].
//! Events are routed to a shard by device-id hash, so one dispatch loop owns
//! all events of a given device and can enforce per-device version ordering
//! without a global bottleneck. Cross-device ordering is not guaranteed.

mod change_notifier;

pub use change_notifier::*;


#[cfg(test)]
use mockall::automock;

use crate::ChangeEvent;

/// Downstream consumer of ordered change events; implemented by the
/// connection manager's fanout entry point.
#[cfg_attr(test, automock)]
pub trait EventSink: Send + Sync + 'static {
    fn deliver(
        &self,
        event: &ChangeEvent,
    );
}
