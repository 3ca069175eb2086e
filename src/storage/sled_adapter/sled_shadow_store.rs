use sled::IVec;
use tracing::trace;
use tracing::warn;

use crate::constants::SHADOW_TREE;
use crate::PutOutcome;
use crate::Result;
use crate::ShadowDocument;
use crate::ShadowStore;
use crate::StorageError;

/// Durable shadow store backed by a sled tree, one bincode-encoded document
/// per device id.
///
/// `sled::Tree::compare_and_swap` on the previously read bytes implements
/// the version check: documents serialize deterministically (ordered maps),
/// so byte equality implies version equality.
pub struct SledShadowStore {
    tree: sled::Tree,
}

impl SledShadowStore {
    pub fn new(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(SHADOW_TREE)?;
        Ok(Self { tree })
    }

    fn decode(
        &self,
        device_id: &str,
        bytes: &IVec,
    ) -> Result<ShadowDocument> {
        bincode::deserialize(bytes).map_err(|e| {
            warn!("corrupt shadow document for {}: {:?}", device_id, e);
            StorageError::DataCorruption {
                location: format!("{}/{}", SHADOW_TREE, device_id),
            }
            .into()
        })
    }
}

impl ShadowStore for SledShadowStore {
    fn get(
        &self,
        device_id: &str,
    ) -> Result<Option<ShadowDocument>> {
        match self.tree.get(device_id.as_bytes())? {
            Some(bytes) => Ok(Some(self.decode(device_id, &bytes)?)),
            None => Ok(None),
        }
    }

    fn conditional_put(
        &self,
        document: &ShadowDocument,
        expected_version: u64,
    ) -> Result<PutOutcome> {
        let key = document.device_id.as_bytes();

        let current = self.tree.get(key)?;
        let actual = match &current {
            Some(bytes) => self.decode(&document.device_id, bytes)?.version,
            None => 0,
        };
        if actual != expected_version {
            return Ok(PutOutcome::VersionMismatch { actual });
        }

        let encoded =
            bincode::serialize(document).map_err(StorageError::BincodeError)?;

        match self
            .tree
            .compare_and_swap(key, current, Some(encoded))?
        {
            Ok(()) => {
                trace!(
                    "persisted shadow {} at v{}",
                    document.device_id,
                    document.version
                );
                Ok(PutOutcome::Committed)
            }
            Err(cas) => {
                // Raced between our read and the swap
                let actual = match cas.current {
                    Some(bytes) => self.decode(&document.device_id, &bytes)?.version,
                    None => 0,
                };
                Ok(PutOutcome::VersionMismatch { actual })
            }
        }
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tree.len()
    }
}
