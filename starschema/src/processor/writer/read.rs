use super::commit::{COMMIT_MARKER, CommitMarker, read_marker};
use crate::models::TableKind;
use crate::storage::StorageRoot;
use crate::utils::digest::sha256_hex;
use crate::utils::paths::PartitionPath;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use common::{Error, Result};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

/// One partition as seen through its commit marker.
#[derive(Debug, Clone)]
pub struct CommittedPartition {
    pub partition: PartitionPath,
    pub marker: CommitMarker,
    pub batches: Vec<RecordBatch>,
}

impl CommittedPartition {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// Reads every committed partition of `table`, ordered by partition path.
/// Data files not named by a marker are never opened.
pub async fn read_committed_table(root: &StorageRoot, table: TableKind) -> Result<Vec<CommittedPartition>> {
    let table_dir = root.dir(table.as_str());
    let mut marker_keys: Vec<String> = root
        .storage
        .list_objects(&table_dir)
        .await?
        .into_iter()
        .filter(|key| {
            key.strip_prefix(&table_dir)
                .is_some_and(|rel| rel == COMMIT_MARKER || rel.ends_with(&format!("/{}", COMMIT_MARKER)))
        })
        .collect();
    marker_keys.sort();

    let mut partitions = Vec::with_capacity(marker_keys.len());
    for marker_key in marker_keys {
        let marker = read_marker(root, &marker_key).await?;
        let dir = marker_key
            .strip_suffix(COMMIT_MARKER)
            .unwrap_or(&marker_key)
            .to_string();
        let data_key = format!("{}{}", dir, marker.file);

        let data = root.storage.get_object(&data_key).await?;
        if sha256_hex(&data) != marker.sha256 {
            return Err(Error::Storage(format!(
                "Data file {} does not match its commit marker",
                data_key
            )));
        }

        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?.build()?;
        let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;

        partitions.push(CommittedPartition {
            partition: PartitionPath::parse(&marker.partition)?,
            marker,
            batches,
        });
    }
    partitions.sort_by(|a, b| a.partition.cmp(&b.partition));
    Ok(partitions)
}
