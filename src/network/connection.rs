use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ClientFrame;
use super::ConnectionLiveness;
use super::ServerFrame;
use crate::metrics::ACTIVE_CONNECTIONS_METRIC;
use crate::metrics::FANOUT_DELIVERIES_METRIC;
use crate::ChangeEvent;
use crate::ConnectionId;
use crate::DeviceId;
use crate::EventSink;
use crate::NetworkConfig;
use crate::SubscriptionRegistry;

/// Lifecycle of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded but not yet serving its outbound loop
    Connecting,
    Open,
    Closing,
}

struct ConnectionHandle {
    outbound: mpsc::Sender<ServerFrame>,
    state: ConnectionState,

    /// Devices whose events were dropped because the outbound buffer was
    /// full. Cleared when the heartbeat tick turns them into resync frames.
    stale_devices: HashSet<DeviceId>,
}

/// Owns every live subscriber connection and is the notifier's event sink.
///
/// Fanout never blocks the dispatch loop: a full outbound buffer marks the
/// device stale on that connection instead of waiting, and the subscriber
/// recovers with a full re-fetch after the resync frame.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    registry: SubscriptionRegistry,
    liveness: ConnectionLiveness,
    outbound_buffer: usize,
}

impl ConnectionManager {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            connections: DashMap::new(),
            registry: SubscriptionRegistry::new(),
            liveness: ConnectionLiveness::new(config.zombie_deadline()),
            outbound_buffer: config.outbound_buffer,
        }
    }

    /// Admits an authenticated connection and hands back its outbound
    /// channel. The caller drives the receiver until close.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerFrame>) {
        let connection_id = nanoid!();
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        self.connections.insert(
            connection_id.clone(),
            ConnectionHandle {
                outbound: tx,
                state: ConnectionState::Connecting,
                stale_devices: HashSet::new(),
            },
        );
        self.liveness.record_activity(&connection_id);
        ACTIVE_CONNECTIONS_METRIC.inc();
        info!("connection {} registered", connection_id);
        (connection_id, rx)
    }

    pub fn mark_open(
        &self,
        connection_id: &str,
    ) {
        if let Some(mut handle) = self.connections.get_mut(connection_id) {
            handle.state = ConnectionState::Open;
        }
    }

    /// Removes the connection and all its subscriptions. Idempotent: the
    /// socket loop and the zombie sweep may both arrive here.
    pub fn teardown(
        &self,
        connection_id: &str,
    ) {
        let Some((_, _handle)) = self.connections.remove(connection_id) else {
            return;
        };
        self.registry.unsubscribe_all(connection_id);
        self.liveness.forget(connection_id);
        ACTIVE_CONNECTIONS_METRIC.dec();
        info!("connection {} torn down", connection_id);
    }

    /// Applies one control frame from the subscriber.
    pub fn handle_control(
        &self,
        connection_id: &str,
        frame: ClientFrame,
    ) {
        match frame {
            ClientFrame::Subscribe { device_id } => {
                self.registry.subscribe(connection_id, &device_id);
            }
            ClientFrame::Unsubscribe { device_id } => {
                self.registry.unsubscribe(connection_id, &device_id);
            }
        }
    }

    pub fn record_activity(
        &self,
        connection_id: &str,
    ) {
        self.liveness.record_activity(connection_id);
    }

    /// Connections silent past the zombie deadline.
    pub fn zombie_candidates(&self) -> Vec<ConnectionId> {
        self.liveness.zombie_candidates()
    }

    /// Drains the devices that overflowed since the last heartbeat tick so
    /// the socket loop can emit one resync frame per device.
    pub fn take_stale_devices(
        &self,
        connection_id: &str,
    ) -> Vec<DeviceId> {
        self.connections
            .get_mut(connection_id)
            .map(|mut handle| handle.stale_devices.drain().collect())
            .unwrap_or_default()
    }

    /// Best-effort push outside the fanout path (heartbeats, errors).
    pub fn send(
        &self,
        connection_id: &str,
        frame: ServerFrame,
    ) {
        if let Some(handle) = self.connections.get(connection_id) {
            // A full buffer is fine here; events have priority
            let _ = handle.outbound.try_send(frame);
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Ids of every live connection, for administrative teardown.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    #[cfg(test)]
    pub fn liveness(&self) -> &ConnectionLiveness {
        &self.liveness
    }
}

impl EventSink for ConnectionManager {
    fn deliver(
        &self,
        event: &ChangeEvent,
    ) {
        let mut gone: Vec<ConnectionId> = Vec::new();

        for connection_id in self.registry.subscribers_of(&event.device_id) {
            let Some(mut handle) = self.connections.get_mut(&connection_id) else {
                continue;
            };
            if handle.state == ConnectionState::Closing {
                continue;
            }
            match handle.outbound.try_send(ServerFrame::event(event.clone())) {
                Ok(()) => {
                    FANOUT_DELIVERIES_METRIC
                        .with_label_values(&["delivered"])
                        .inc();
                }
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "connection {} behind on {}, scheduling resync",
                        connection_id, event.device_id
                    );
                    handle.stale_devices.insert(event.device_id.clone());
                    FANOUT_DELIVERIES_METRIC
                        .with_label_values(&["overflow"])
                        .inc();
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("connection {} outbound closed during fanout", connection_id);
                    handle.state = ConnectionState::Closing;
                    FANOUT_DELIVERIES_METRIC
                        .with_label_values(&["closed"])
                        .inc();
                    gone.push(connection_id);
                }
            }
        }

        for connection_id in gone {
            self.teardown(&connection_id);
        }
    }
}

/// Shared handle type the server routes carry.
pub type SharedConnectionManager = Arc<ConnectionManager>;
