use crate::Result;
use crate::ShadowDocument;

#[cfg(test)]
use mockall::automock;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The stored version matched and the document was persisted
    Committed,

    /// Another writer got there first; the caller must re-run its
    /// read-merge-write cycle
    VersionMismatch { actual: u64 },
}

/// Durable keyed storage for one shadow document per device.
///
/// `conditional_put` is the engine's sole serialization point: a write is
/// accepted only when the stored version equals `expected_version`, with an
/// absent document counting as version 0. Implementations must make the
/// compare-and-swap atomic; no caller holds an application-level lock.
#[cfg_attr(test, automock)]
pub trait ShadowStore: Send + Sync + 'static {
    fn get(
        &self,
        device_id: &str,
    ) -> Result<Option<ShadowDocument>>;

    fn conditional_put(
        &self,
        document: &ShadowDocument,
        expected_version: u64,
    ) -> Result<PutOutcome>;

    fn flush(&self) -> Result<()>;

    #[cfg(test)]
    fn len(&self) -> usize;

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
