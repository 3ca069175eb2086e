use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use crate::metrics::ACTIVE_SUBSCRIPTIONS_METRIC;

pub type ConnectionId = String;
pub type DeviceId = String;

/// Tracks which live connections watch which devices.
///
/// The (connection, device) relation is kept in two indexes over DashMap
/// shards: fanout looks up by device id, teardown cleans up by connection
/// id, both O(1) average and never behind one global lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_device: DashMap<DeviceId, HashSet<ConnectionId>>,
    by_connection: DashMap<ConnectionId, HashSet<DeviceId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest. Idempotent for a repeated subscribe.
    pub fn subscribe(
        &self,
        connection_id: &str,
        device_id: &str,
    ) {
        let inserted = self
            .by_device
            .entry(device_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.by_connection
            .entry(connection_id.to_string())
            .or_default()
            .insert(device_id.to_string());

        if inserted {
            ACTIVE_SUBSCRIPTIONS_METRIC.inc();
            debug!("connection {} subscribed to {}", connection_id, device_id);
        }
    }

    /// Drops one (connection, device) pair. Safe when absent.
    pub fn unsubscribe(
        &self,
        connection_id: &str,
        device_id: &str,
    ) {
        let mut removed = false;
        if let Some(mut watchers) = self.by_device.get_mut(device_id) {
            removed = watchers.remove(connection_id);
        }
        self.by_device
            .remove_if(device_id, |_, watchers| watchers.is_empty());

        if let Some(mut devices) = self.by_connection.get_mut(connection_id) {
            devices.remove(device_id);
        }
        self.by_connection
            .remove_if(connection_id, |_, devices| devices.is_empty());

        if removed {
            ACTIVE_SUBSCRIPTIONS_METRIC.dec();
        }
    }

    /// Fanout lookup: all connections watching the device.
    pub fn subscribers_of(
        &self,
        device_id: &str,
    ) -> Vec<ConnectionId> {
        self.by_device
            .get(device_id)
            .map(|watchers| watchers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Teardown cleanup: removes every subscription of the connection.
    /// Called once per disconnect; calling twice is a no-op.
    pub fn unsubscribe_all(
        &self,
        connection_id: &str,
    ) {
        let Some((_, devices)) = self.by_connection.remove(connection_id) else {
            return;
        };

        for device_id in devices {
            let mut removed = false;
            if let Some(mut watchers) = self.by_device.get_mut(&device_id) {
                removed = watchers.remove(connection_id);
            }
            self.by_device
                .remove_if(&device_id, |_, watchers| watchers.is_empty());
            if removed {
                ACTIVE_SUBSCRIPTIONS_METRIC.dec();
            }
        }
        debug!("connection {} fully unsubscribed", connection_id);
    }

    /// Devices the connection currently watches.
    pub fn devices_of(
        &self,
        connection_id: &str,
    ) -> Vec<DeviceId> {
        self.by_connection
            .get(connection_id)
            .map(|devices| devices.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscription_count(&self) -> usize {
        self.by_connection
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }
}
