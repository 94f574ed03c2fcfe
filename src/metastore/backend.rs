use crate::error::{EntityKind, Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;

/// Outcome of a create-only write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// Another writer got there first; carries the stored value.
    Existing(Vec<u8>),
}

/// Key-value storage behind the Metastore. Keys are `<kind>/<hex id>`.
///
/// `put_if_absent` must be linearizable per key: of several concurrent callers
/// proposing a value for the same key exactly one observes `Created`, every other
/// one observes `Existing` with the winner's bytes.
#[tonic::async_trait]
pub trait MetastoreBackend: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<PutOutcome>;

    /// Number of stored entities of the given kind.
    async fn count(&self, kind: EntityKind) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl MetastoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::internal("Failed to lock metastore entries"))?;
        Ok(entries.get(key).cloned())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<PutOutcome> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Error::internal("Failed to lock metastore entries"))?;

        if let Some(existing) = entries.get(key) {
            return Ok(PutOutcome::Existing(existing.clone()));
        }

        entries.insert(key.to_string(), value);
        Ok(PutOutcome::Created)
    }

    async fn count(&self, kind: EntityKind) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| Error::internal("Failed to lock metastore entries"))?;
        let prefix = format!("{}/", kind);
        Ok(entries.keys().filter(|k| k.starts_with(&prefix)).count())
    }
}
