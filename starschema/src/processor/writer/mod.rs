pub mod commit;
pub mod encode;
pub mod read;

pub use commit::{COMMIT_MARKER, CommitMarker, commit_partition};
pub use read::{CommittedPartition, read_committed_table};

use crate::models::{TableKind, TableRow};
use crate::storage::StorageRoot;
use crate::utils::paths::PartitionPath;
use common::{Error, Result};
use encode::encode_parquet;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Outcome of writing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWrite {
    pub table: TableKind,
    pub rows: usize,
    pub partitions: Vec<CommitMarker>,
}

/// Writes tables as Parquet with overwrite-by-partition semantics.
pub struct PartitionedWriter {
    root: StorageRoot,
    write_concurrency: usize,
}

impl PartitionedWriter {
    pub fn new(root: StorageRoot, write_concurrency: usize) -> Self {
        Self {
            root,
            write_concurrency: write_concurrency.max(1),
        }
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Groups `rows` by partition and commits every partition they touch.
    /// Unpartitioned tables always commit their root, even when empty, so a
    /// rebuilt table never keeps rows from an earlier run.
    pub async fn write_table<R: TableRow>(&self, rows: &[R]) -> Result<TableWrite> {
        let table = R::TABLE;

        let mut grouped: BTreeMap<PartitionPath, Vec<&R>> = BTreeMap::new();
        if table.partition_columns().is_empty() {
            grouped.insert(PartitionPath::root(), Vec::new());
        }
        for row in rows {
            grouped.entry(row.partition()).or_default().push(row);
        }

        let mut encoded = Vec::with_capacity(grouped.len());
        for (partition, mut partition_rows) in grouped {
            partition_rows.sort_by_key(|row| row.key());
            let batch = R::to_record_batch(&partition_rows)
                .map_err(|e| Error::write(format!("{}/{}", table.as_str(), partition), e))?;
            let data = encode_parquet(table, &batch)
                .map_err(|e| Error::write(format!("{}/{}", table.as_str(), partition), e))?;
            debug!(
                table = table.as_str(),
                partition = %partition,
                rows = partition_rows.len(),
                bytes = data.len(),
                "Encoded partition"
            );
            encoded.push((partition, data, partition_rows.len()));
        }

        let root = &self.root;
        let mut partitions: Vec<CommitMarker> = stream::iter(encoded)
            .map(|(partition, data, count)| async move {
                commit_partition(root, table, &partition, data, count)
                    .await
                    .map_err(|e| Error::write(format!("{}/{}", table.as_str(), partition), e))
            })
            .buffer_unordered(self.write_concurrency)
            .try_collect()
            .await?;
        partitions.sort_by(|a, b| a.partition.cmp(&b.partition));

        info!(
            table = table.as_str(),
            rows = rows.len(),
            partitions = partitions.len(),
            "Wrote table"
        );
        Ok(TableWrite {
            table,
            rows: rows.len(),
            partitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SongRow, TimeRow, UserRow, Gender};
    use crate::storage::s3::ObjectStorage;
    use crate::storage::store::ObjectStoreStorage;
    use crate::utils::arrow::collect_strings;
    use std::sync::Arc;

    fn writer() -> PartitionedWriter {
        PartitionedWriter::new(
            StorageRoot::new(Arc::new(ObjectStoreStorage::in_memory()), "star"),
            2,
        )
    }

    fn song(song_id: &str, artist_id: &str, year: i32) -> SongRow {
        SongRow {
            song_id: song_id.to_string(),
            title: format!("Title {}", song_id),
            artist_id: artist_id.to_string(),
            year,
            duration: 180.0,
        }
    }

    #[tokio::test]
    async fn test_songs_are_partitioned_and_sorted() {
        let writer = writer();
        let songs = vec![song("S2", "A1", 2000), song("S1", "A1", 2000), song("S3", "A 2", 0)];

        let result = writer.write_table(&songs).await.unwrap();
        assert_eq!(result.rows, 3);
        let paths: Vec<&str> = result.partitions.iter().map(|m| m.partition.as_str()).collect();
        assert_eq!(paths, vec!["year=0/artist_id=A+202", "year=2000/artist_id=A1"]);

        let committed = read_committed_table(writer.root(), TableKind::Songs).await.unwrap();
        assert_eq!(committed.len(), 2);
        assert_eq!(
            committed[0].partition,
            PartitionPath::root().with_value("year", 0).with_value("artist_id", "A 2")
        );
        let ids = collect_strings(&committed[1].batches, "song_id").unwrap();
        assert_eq!(ids, vec![Some("S1".to_string()), Some("S2".to_string())]);
    }

    #[tokio::test]
    async fn test_untouched_partitions_are_preserved() {
        let writer = writer();
        let november = TimeRow::from_millis(1_542_241_826_796).unwrap();
        let december = TimeRow::from_millis(1_543_622_400_000).unwrap();
        writer.write_table(&[november.clone(), december]).await.unwrap();

        // A later run that only touches November leaves December alone
        writer.write_table(&[november]).await.unwrap();
        let committed = read_committed_table(writer.root(), TableKind::Time).await.unwrap();
        let paths: Vec<String> = committed
            .iter()
            .map(|p| p.partition.build_storage_path())
            .collect();
        assert_eq!(paths, vec!["year=2018/month=11", "year=2018/month=12"]);
    }

    #[tokio::test]
    async fn test_empty_unpartitioned_table_replaces_previous_rows() {
        let writer = writer();
        let user = UserRow {
            user_id: "1".to_string(),
            first_name: None,
            last_name: None,
            gender: Gender::Unknown,
            level: None,
        };
        writer.write_table(&[user]).await.unwrap();
        let result = writer.write_table::<UserRow>(&[]).await.unwrap();
        assert_eq!(result.partitions.len(), 1);

        let committed = read_committed_table(writer.root(), TableKind::Users).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].num_rows(), 0);

        let files = writer.root().storage.list_objects("star/users/").await.unwrap();
        assert_eq!(files.len(), 2);
    }
}
