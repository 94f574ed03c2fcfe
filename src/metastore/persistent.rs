use super::backend::{MetastoreBackend, PutOutcome};
use crate::error::{EntityKind, Result};
use futures::StreamExt;
use object_store::{path::Path, ObjectStore, PutMode, PutOptions, PutPayload};
use std::sync::Arc;

/// Metastore backend persisting every entity as one object.
///
/// Writes are create-only; a lost race is detected through `AlreadyExists` and
/// resolved by reading back the winner's object.
#[derive(Debug)]
pub struct ObjectStoreBackend {
    bucket: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(bucket: Arc<dyn ObjectStore>) -> Self {
        Self { bucket }
    }

    /// Persists under `dir`, creating it if needed.
    pub fn local(dir: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let fs = object_store::local::LocalFileSystem::new_with_prefix(dir.as_ref())?;
        Ok(Self::new(Arc::new(fs)))
    }
}

#[tonic::async_trait]
impl MetastoreBackend for ObjectStoreBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.bucket.get(&Path::from(key)).await {
            Ok(res) => Ok(Some(res.bytes().await?.to_vec())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<PutOutcome> {
        let path = Path::from(key);
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };

        match self
            .bucket
            .put_opts(&path, PutPayload::from(value), opts)
            .await
        {
            Ok(_) => Ok(PutOutcome::Created),
            Err(object_store::Error::AlreadyExists { .. }) => {
                let existing = self.bucket.get(&path).await?.bytes().await?;
                Ok(PutOutcome::Existing(existing.to_vec()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, kind: EntityKind) -> Result<usize> {
        let prefix = Path::from(kind.as_str());
        let mut listing = self.bucket.list(Some(&prefix));
        let mut n = 0;
        while let Some(meta) = listing.next().await {
            meta?;
            n += 1;
        }
        Ok(n)
    }
}
