use crate::storage::s3::ObjectStorage;
use async_trait::async_trait;
use bytes::Bytes;
use common::{Error, Result};
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

/// [`ObjectStorage`] backed by an `object_store` implementation. Used for
/// local directories and for in-memory stores in tests.
pub struct ObjectStoreStorage {
    name: String,
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreStorage {
    pub fn new(name: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.to_string(),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new("memory", Arc::new(InMemory::new()))
    }

    /// Opens a local directory, creating it if missing.
    pub fn local(root: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(&root.to_string_lossy(), Arc::new(store)))
    }

    fn path(key: &str) -> Result<Path> {
        Path::parse(key.trim_matches('/'))
            .map_err(|e| Error::InvalidInput(format!("Invalid object key '{}': {}", key, e)))
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreStorage {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let payload = PutPayload::from(Bytes::copy_from_slice(data));
        self.store.put(&Self::path(key)?, payload).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let result = self.store.get(&Self::path(key)?).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                Error::Storage(format!("Object {} not found in {}", key, self.name))
            }
            other => other.into(),
        })?;
        Ok(result.bytes().await?.to_vec())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(Self::path(prefix)?)
        };

        let objects: Vec<_> = self
            .store
            .list(prefix_path.as_ref())
            .try_collect()
            .await?;

        Ok(objects
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        match self.store.delete(&Self::path(key)?).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn bucket(&self) -> &str {
        &self.name
    }
}
