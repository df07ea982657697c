use crate::models::TableKind;
use crate::storage::StorageRoot;
use crate::utils::digest::sha256_hex;
use crate::utils::paths::PartitionPath;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the object whose presence makes a partition visible.
pub const COMMIT_MARKER: &str = "_SUCCESS";

const DATA_FILE_PREFIX: &str = "part-";
const DATA_FILE_SUFFIX: &str = ".parquet";

/// Content of a partition's commit marker: the one data file readers should
/// load. Carries no wall-clock time so re-runs rewrite identical markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMarker {
    pub table: TableKind,
    /// Storage path of the partition, empty for the table root.
    pub partition: String,
    pub file: String,
    pub rows: usize,
    pub sha256: String,
}

pub fn data_file_name(sha256: &str) -> String {
    let short = sha256.get(..16).unwrap_or(sha256);
    format!("{}{}{}", DATA_FILE_PREFIX, short, DATA_FILE_SUFFIX)
}

fn is_data_file(name: &str) -> bool {
    name.starts_with(DATA_FILE_PREFIX) && name.ends_with(DATA_FILE_SUFFIX)
}

/// Relative key of a partition directory under the output root.
pub fn partition_dir(table: TableKind, partition: &PartitionPath) -> String {
    if partition.is_root() {
        table.as_str().to_string()
    } else {
        format!("{}/{}", table.as_str(), partition.build_storage_path())
    }
}

/// Relative key of object `name` inside a partition directory.
pub fn partition_key(table: TableKind, partition: &PartitionPath, name: &str) -> String {
    format!("{}/{}", table.as_str(), partition.build_file_path(name))
}

/// Publishes `data` as the sole content of one partition.
///
/// The data file goes to a content-addressed key first, then the marker is
/// overwritten to point at it, then data files the marker no longer names are
/// removed. A reader that follows the marker sees either the old or the new
/// partition, never a mix.
pub async fn commit_partition(
    root: &StorageRoot,
    table: TableKind,
    partition: &PartitionPath,
    data: Vec<u8>,
    rows: usize,
) -> Result<CommitMarker> {
    let dir = partition_dir(table, partition);
    let sha256 = sha256_hex(&data);
    let file = data_file_name(&sha256);

    let data_key = root.key(&partition_key(table, partition, &file));
    root.storage.put_object(&data_key, &data).await?;
    debug!(key = %data_key, bytes = data.len(), "Wrote partition data file");

    let marker = CommitMarker {
        table,
        partition: partition.build_storage_path(),
        file: file.clone(),
        rows,
        sha256,
    };
    let marker_key = root.key(&partition_key(table, partition, COMMIT_MARKER));
    root.storage
        .put_object(&marker_key, &serde_json::to_vec_pretty(&marker)?)
        .await?;
    debug!(key = %marker_key, rows, "Committed partition");

    remove_stale_files(root, &dir, &file).await?;
    Ok(marker)
}

/// Deletes data files directly inside `dir` other than `keep`.
async fn remove_stale_files(root: &StorageRoot, dir: &str, keep: &str) -> Result<()> {
    let listing = root.dir(dir);
    for key in root.storage.list_objects(&listing).await? {
        let Some(name) = key.strip_prefix(&listing) else {
            continue;
        };
        if name.contains('/') || !is_data_file(name) || name == keep {
            continue;
        }
        root.storage.delete_object(&key).await?;
        debug!(key = %key, "Removed stale data file");
    }
    Ok(())
}

/// Loads the marker stored at `marker_key`.
pub async fn read_marker(root: &StorageRoot, marker_key: &str) -> Result<CommitMarker> {
    let bytes = root.storage.get_object(marker_key).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::Storage(format!("Invalid commit marker at {}: {}", marker_key, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::s3::ObjectStorage;
    use crate::storage::store::ObjectStoreStorage;
    use std::sync::Arc;

    fn root() -> StorageRoot {
        StorageRoot::new(Arc::new(ObjectStoreStorage::in_memory()), "lake")
    }

    #[test]
    fn test_data_file_name() {
        let sha = sha256_hex(b"abc");
        assert_eq!(data_file_name(&sha), "part-ba7816bf8f01cfea.parquet");
        assert!(is_data_file(&data_file_name(&sha)));
        assert!(!is_data_file(COMMIT_MARKER));
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_file() {
        let root = root();
        let partition = PartitionPath::root()
            .with_value("year", 2018)
            .with_value("month", 11);

        let first = commit_partition(&root, TableKind::Time, &partition, b"one".to_vec(), 1)
            .await
            .unwrap();
        let second = commit_partition(&root, TableKind::Time, &partition, b"two".to_vec(), 2)
            .await
            .unwrap();
        assert_ne!(first.file, second.file);

        let keys = root.storage.list_objects("lake/time/").await.unwrap();
        let mut names: Vec<&str> = keys
            .iter()
            .filter_map(|k| k.strip_prefix("lake/time/year=2018/month=11/"))
            .collect();
        names.sort();
        assert_eq!(names, vec![COMMIT_MARKER, second.file.as_str()]);

        let marker = read_marker(&root, "lake/time/year=2018/month=11/_SUCCESS")
            .await
            .unwrap();
        assert_eq!(marker, second);
        assert_eq!(marker.partition, "year=2018/month=11");
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let root = root();
        let partition = PartitionPath::root();
        let first = commit_partition(&root, TableKind::Users, &partition, b"rows".to_vec(), 3)
            .await
            .unwrap();
        let marker_bytes = root.storage.get_object("lake/users/_SUCCESS").await.unwrap();

        let second = commit_partition(&root, TableKind::Users, &partition, b"rows".to_vec(), 3)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            root.storage.get_object("lake/users/_SUCCESS").await.unwrap(),
            marker_bytes
        );
        assert_eq!(root.storage.list_objects("lake/users/").await.unwrap().len(), 2);
    }
}
