use std::time::Duration;

use dashmap::DashMap;

use crate::utils::time;
use crate::ConnectionId;

/// Last-activity tracking for open WebSocket connections.
///
/// Any inbound traffic counts as activity, including transport pongs. The
/// heartbeat tick asks for zombie candidates and force-closes them.
pub struct ConnectionLiveness {
    last_activity: DashMap<ConnectionId, u64>,
    deadline: Duration,
}

impl ConnectionLiveness {
    pub fn new(deadline: Duration) -> Self {
        Self {
            last_activity: DashMap::new(),
            deadline,
        }
    }

    pub fn record_activity(
        &self,
        connection_id: &str,
    ) {
        self.last_activity
            .insert(connection_id.to_string(), time::now_millis());
    }

    pub fn forget(
        &self,
        connection_id: &str,
    ) {
        self.last_activity.remove(connection_id);
    }

    /// Connections silent past the deadline.
    pub fn zombie_candidates(&self) -> Vec<ConnectionId> {
        let cutoff = time::now_millis().saturating_sub(self.deadline.as_millis() as u64);
        self.last_activity
            .iter()
            .filter(|entry| *entry.value() < cutoff)
            .map(|entry| entry.key().clone())
            .collect()
    }

    #[cfg(test)]
    pub fn backdate(
        &self,
        connection_id: &str,
        age: Duration,
    ) {
        self.last_activity.insert(
            connection_id.to_string(),
            time::now_millis().saturating_sub(age.as_millis() as u64),
        );
    }
}
