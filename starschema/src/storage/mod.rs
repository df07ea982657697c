pub mod s3;
pub mod store;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use common::config::S3Settings;
use common::{Error, Result};
use s3::{ObjectStorage, S3Storage};
use std::path::PathBuf;
use std::sync::Arc;
use store::ObjectStoreStorage;
use tracing::debug;
use url::Url;

#[derive(Clone, Debug)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl From<&S3Settings> for S3Config {
    fn from(settings: &S3Settings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            region: settings.region.clone(),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
        }
    }
}

#[derive(Clone)]
pub struct S3Manager {
    pub config: S3Config,
    client_cache: Arc<dashmap::DashMap<String, Arc<S3Client>>>,
}

impl S3Manager {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            client_cache: Arc::new(dashmap::DashMap::new()),
        }
    }

    pub async fn get_client(&self, bucket: &str) -> Result<Arc<S3Client>> {
        if let Some(client) = self.client_cache.get(bucket) {
            return Ok(client.clone());
        }

        let mut builder = match (&self.config.access_key, &self.config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "static");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        builder = builder.region(Region::new(self.config.region.clone()));
        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Arc::new(aws_sdk_s3::Client::from_conf(builder.build()));
        self.client_cache.insert(bucket.to_string(), client.clone());
        Ok(client)
    }

    /// Verifies that a bucket exists and is accessible
    pub async fn verify_bucket_exists(&self, bucket: &str) -> Result<()> {
        let client = self.get_client(bucket).await?;

        client.head_bucket().bucket(bucket).send().await?;
        debug!(bucket, "Bucket is accessible");
        Ok(())
    }
}

/// Where a table root or an input root lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    S3 { bucket: String, prefix: String },
    Local { root: PathBuf },
}

impl StorageLocation {
    /// Accepts `s3://bucket/prefix`, `file:///abs/path` or a plain filesystem path.
    pub fn parse(uri: &str) -> Result<Self> {
        if !uri.contains("://") {
            return Ok(StorageLocation::Local {
                root: PathBuf::from(uri),
            });
        }

        let url = Url::parse(uri)?;
        match url.scheme() {
            "s3" | "s3a" => {
                let bucket = url
                    .host_str()
                    .filter(|b| !b.is_empty())
                    .ok_or_else(|| Error::InvalidUri(format!("Missing bucket in '{}'", uri)))?;
                Ok(StorageLocation::S3 {
                    bucket: bucket.to_string(),
                    prefix: url.path().trim_matches('/').to_string(),
                })
            }
            "file" => {
                let root = url
                    .to_file_path()
                    .map_err(|_| Error::InvalidUri(format!("Invalid file URL '{}'", uri)))?;
                Ok(StorageLocation::Local { root })
            }
            other => Err(Error::InvalidUri(format!(
                "Unsupported scheme '{}' in '{}'",
                other, uri
            ))),
        }
    }
}

/// A storage backend plus the key prefix everything of interest lives under.
#[derive(Clone)]
pub struct StorageRoot {
    pub storage: Arc<dyn ObjectStorage>,
    pub prefix: String,
}

impl StorageRoot {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Joins `relative` onto the root prefix.
    pub fn key(&self, relative: &str) -> String {
        let relative = relative.trim_matches('/');
        match (self.prefix.is_empty(), relative.is_empty()) {
            (true, _) => relative.to_string(),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, relative),
        }
    }

    /// Key prefix for listing everything under `relative`.
    pub fn dir(&self, relative: &str) -> String {
        let key = self.key(relative);
        if key.is_empty() { key } else { format!("{}/", key) }
    }

    pub async fn open(location: &StorageLocation, s3_manager: Option<&Arc<S3Manager>>) -> Result<Self> {
        match location {
            StorageLocation::Local { root } => {
                debug!(root = %root.display(), "Opening local storage");
                let storage = ObjectStoreStorage::local(root)?;
                Ok(Self::new(Arc::new(storage), ""))
            }
            StorageLocation::S3 { bucket, prefix } => {
                let manager = s3_manager.ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Location s3://{}/{} requires [s3] settings",
                        bucket, prefix
                    ))
                })?;
                debug!(bucket = %bucket, prefix = %prefix, "Opening S3 storage");
                manager.verify_bucket_exists(bucket).await?;
                let storage = S3Storage::new(manager.clone(), bucket).await?;
                Ok(Self::new(Arc::new(storage), prefix))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_location() {
        let location = StorageLocation::parse("s3a://udacity-dend/data/").unwrap();
        assert_eq!(
            location,
            StorageLocation::S3 {
                bucket: "udacity-dend".to_string(),
                prefix: "data".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_local_location() {
        assert_eq!(
            StorageLocation::parse("/tmp/star").unwrap(),
            StorageLocation::Local {
                root: PathBuf::from("/tmp/star")
            }
        );
        assert_eq!(
            StorageLocation::parse("file:///tmp/star").unwrap(),
            StorageLocation::Local {
                root: PathBuf::from("/tmp/star")
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = StorageLocation::parse("ftp://host/path").unwrap_err();
        assert!(matches!(err, Error::InvalidUri(_)));
    }

    #[test]
    fn test_storage_root_keys() {
        let root = StorageRoot::new(Arc::new(ObjectStoreStorage::in_memory()), "/star/");
        assert_eq!(root.key("songs/_SUCCESS"), "star/songs/_SUCCESS");
        assert_eq!(root.dir("songs"), "star/songs/");

        let bare = StorageRoot::new(Arc::new(ObjectStoreStorage::in_memory()), "");
        assert_eq!(bare.key("/songs/"), "songs");
        assert_eq!(bare.dir(""), "");
    }
}
