use crate::storage::S3Manager;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use common::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Minimal object-store surface the transform needs. Keys are relative to the
/// bucket (or store root) and use `/` as the hierarchy delimiter.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;
    /// Every key starting with `prefix`, in no particular order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
    /// Removing a missing object is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;
    fn bucket(&self) -> &str;
}

pub struct S3Storage {
    bucket: String,
    client: Arc<S3Client>,
}

impl S3Storage {
    pub async fn new(s3_manager: Arc<S3Manager>, bucket: &str) -> Result<Self> {
        let client = s3_manager.get_client(bucket).await?;

        Ok(Self {
            client,
            bucket: bucket.to_string(),
        })
    }

    fn error(&self, op: &str, key: &str, err: impl std::error::Error) -> Error {
        Error::Storage(format!(
            "S3 {} s3://{}/{} failed: {}",
            op,
            self.bucket,
            key,
            DisplayErrorContext(err)
        ))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let body = ByteStream::from(Bytes::copy_from_slice(data));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| self.error("put", key, e))?;
        debug!(bucket = %self.bucket, key, bytes = data.len(), "Put object");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    Error::Storage(format!("Object {} not found in bucket {}", key, self.bucket))
                } else {
                    self.error("get", key, e)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| self.error("read", key, e))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| self.error("list", prefix, e))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }
        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.error("delete", key, e))?;
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
