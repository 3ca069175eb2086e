use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// Attribute name → value map. Ordered so serialized documents are
/// byte-stable, which the sled adapter's compare-and-swap relies on.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A typed attribute value as asserted by a device or requested by an
/// operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Number(_) => "number",
            AttributeValue::Text(_) => "text",
        }
    }
}

/// Which side of the shadow a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Last-known-true state asserted by the device
    Reported,
    /// Target state requested by an operator
    Desired,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Reported => "reported",
            StateKind::Desired => "desired",
        }
    }
}

/// Equality rule used for pending tracking. Implemented by the attribute
/// validator so numeric tolerance comes from configuration instead of being
/// guessed at each comparison site.
pub trait AttributeEquality: Send + Sync {
    /// True when `reported` satisfies `desired` for the named attribute.
    fn converged(&self, name: &str, desired: &AttributeValue, reported: &AttributeValue) -> bool;
}

/// Exact-match equality, used where no schema applies.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactEquality;

impl AttributeEquality for ExactEquality {
    fn converged(&self, _name: &str, desired: &AttributeValue, reported: &AttributeValue) -> bool {
        desired == reported
    }
}

/// Attribute names that moved in or out of the pending set during one
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingDelta {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub added: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub removed: BTreeSet<String>,
}

impl PendingDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The canonical state record for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocument {
    /// Opaque device identifier; registry membership is checked upstream
    pub device_id: String,

    /// Last state asserted by the device itself
    pub reported: AttributeMap,

    /// Last target state requested by an operator
    pub desired: AttributeMap,

    /// Attributes present in `desired` and not yet confirmed by a matching
    /// `reported` value
    pub pending: BTreeSet<String>,

    /// Strictly increasing write counter; the optimistic-concurrency token
    pub version: u64,

    /// Epoch milliseconds of the last accepted write
    pub updated_at: u64,
}

impl ShadowDocument {
    /// Synthesizes the pre-creation document: version 0, both maps empty.
    /// The first accepted write produces version 1.
    pub fn empty(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            reported: AttributeMap::new(),
            desired: AttributeMap::new(),
            pending: BTreeSet::new(),
            version: 0,
            updated_at: 0,
        }
    }

    pub fn state(&self, kind: StateKind) -> &AttributeMap {
        match kind {
            StateKind::Reported => &self.reported,
            StateKind::Desired => &self.desired,
        }
    }

    /// Shallow key-wise overwrite of the targeted state map.
    ///
    /// Returns the keys whose value actually changed, for the change event.
    /// Last-writer-wins applies at attribute granularity, never to the
    /// whole document.
    pub fn merge(&mut self, kind: StateKind, delta: &AttributeMap) -> AttributeMap {
        let target = match kind {
            StateKind::Reported => &mut self.reported,
            StateKind::Desired => &mut self.desired,
        };

        let mut changed = AttributeMap::new();
        for (name, value) in delta {
            if target.get(name) != Some(value) {
                changed.insert(name.clone(), value.clone());
            }
            target.insert(name.clone(), value.clone());
        }
        changed
    }

    /// Recomputes the pending set from scratch: an attribute is pending iff
    /// it exists in `desired` and the reported value is absent or not
    /// converged under the attribute's equality rule.
    pub fn recompute_pending(&mut self, equality: &dyn AttributeEquality) -> PendingDelta {
        let next: BTreeSet<String> = self
            .desired
            .iter()
            .filter(|(name, desired)| match self.reported.get(*name) {
                Some(reported) => !equality.converged(name, desired, reported),
                None => true,
            })
            .map(|(name, _)| name.clone())
            .collect();

        let delta = PendingDelta {
            added: next.difference(&self.pending).cloned().collect(),
            removed: self.pending.difference(&next).cloned().collect(),
        };
        self.pending = next;
        delta
    }
}
