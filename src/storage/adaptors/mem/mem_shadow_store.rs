use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::PutOutcome;
use crate::Result;
use crate::ShadowDocument;
use crate::ShadowStore;

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory shadow store implementation.
///
/// The version check and the insert happen under one write lock, giving the
/// same atomic compare-and-swap contract as the durable adapter. Used by
/// tests and embedded deployments that accept losing state on restart.
#[derive(Debug, Default)]
pub struct MemoryShadowStore {
    documents: RwLock<HashMap<String, ShadowDocument>>,

    #[cfg(test)]
    unavailable_puts: AtomicUsize,
}

impl MemoryShadowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShadowStore for MemoryShadowStore {
    fn get(
        &self,
        device_id: &str,
    ) -> Result<Option<ShadowDocument>> {
        let documents = self.documents.read();
        Ok(documents.get(device_id).cloned())
    }

    fn conditional_put(
        &self,
        document: &ShadowDocument,
        expected_version: u64,
    ) -> Result<PutOutcome> {
        #[cfg(test)]
        if self.unavailable_puts.load(Ordering::SeqCst) > 0 {
            self.unavailable_puts.fetch_sub(1, Ordering::SeqCst);
            return Err(crate::StorageError::Unavailable(
                "injected transient failure".to_string(),
            )
            .into());
        }

        let mut documents = self.documents.write();
        let actual = documents
            .get(&document.device_id)
            .map(|d| d.version)
            .unwrap_or(0);

        if actual != expected_version {
            trace!(
                "conditional_put rejected for {}: expected v{}, actual v{}",
                document.device_id,
                expected_version,
                actual
            );
            return Ok(PutOutcome::VersionMismatch { actual });
        }

        documents.insert(document.device_id.clone(), document.clone());
        Ok(PutOutcome::Committed)
    }

    fn flush(&self) -> Result<()> {
        trace!("MemoryShadowStore flush (no-op)");
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.documents.read().len()
    }
}

// Test helper methods
#[cfg(test)]
impl MemoryShadowStore {
    /// Makes the next `count` conditional writes fail as transiently
    /// unavailable, for retry-path tests.
    pub fn inject_unavailable(
        &self,
        count: usize,
    ) {
        self.unavailable_puts.store(count, Ordering::SeqCst);
    }

    pub fn insert(
        &self,
        document: ShadowDocument,
    ) {
        let mut documents = self.documents.write();
        documents.insert(document.device_id.clone(), document);
    }
}
