use super::decode::RECORD_FIELD;
use super::{SchemaViolation, parse_line};
use crate::models::{CatalogRecord, EventRecord, ParsedRecord};
use crate::storage::StorageRoot;
use common::{Error, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Catalog,
    Events,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Catalog => "catalog",
            SourceKind::Events => "events",
        }
    }
}

/// Per-source record accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub files: usize,
    pub records: usize,
    pub malformed: usize,
}

impl SourceStats {
    pub fn total(&self) -> usize {
        self.records + self.malformed
    }

    pub fn malformed_fraction(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.malformed as f64 / self.total() as f64
        }
    }

    /// Fails when the malformed fraction is strictly above `threshold`.
    pub fn check_threshold(&self, kind: SourceKind, threshold: f64) -> Result<()> {
        let fraction = self.malformed_fraction();
        if fraction > threshold {
            return Err(Error::Ingest(format!(
                "{} of {} {} records are malformed ({:.1}% exceeds the {:.1}% threshold)",
                self.malformed,
                self.total(),
                kind.as_str(),
                fraction * 100.0,
                threshold * 100.0
            )));
        }
        Ok(())
    }
}

/// Typed rows from both sources, plus their accounting.
#[derive(Debug, Default)]
pub struct ParsedInput {
    pub catalog: Vec<CatalogRecord>,
    pub events: Vec<EventRecord>,
    pub stats: BTreeMap<SourceKind, SourceStats>,
}

impl ParsedInput {
    fn push(&mut self, record: ParsedRecord) {
        match record {
            ParsedRecord::Catalog(r) => self.catalog.push(r),
            ParsedRecord::Event(r) => self.events.push(r),
        }
    }

    pub fn malformed_counts(&self) -> BTreeMap<SourceKind, usize> {
        self.stats.iter().map(|(k, s)| (*k, s.malformed)).collect()
    }

    pub fn check_thresholds(&self, threshold: f64) -> Result<()> {
        for (kind, stats) in &self.stats {
            stats.check_threshold(*kind, threshold)?;
        }
        Ok(())
    }
}

/// Reads newline-delimited JSON sources from an input root.
pub struct RecordReader {
    root: StorageRoot,
    read_concurrency: usize,
}

impl RecordReader {
    pub fn new(root: StorageRoot, read_concurrency: usize) -> Self {
        Self {
            root,
            read_concurrency: read_concurrency.max(1),
        }
    }

    /// Lists the `.json` objects under `prefix`, sorted by key.
    pub async fn list_source_files(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.root.dir(prefix);
        let mut keys: Vec<String> = self
            .root
            .storage
            .list_objects(&dir)
            .await
            .map_err(|e| Error::Ingest(format!("Cannot list input location '{}': {}", dir, e)))?
            .into_iter()
            .filter(|key| key.ends_with(".json"))
            .collect();
        keys.sort();

        if keys.is_empty() {
            return Err(Error::Ingest(format!(
                "No input files found under '{}' in {}",
                dir,
                self.root.storage.bucket()
            )));
        }
        Ok(keys)
    }

    /// Reads and parses every file of one source into `input`.
    pub async fn read_source(&self, kind: SourceKind, prefix: &str, input: &mut ParsedInput) -> Result<()> {
        let keys = self.list_source_files(prefix).await?;
        info!(source = kind.as_str(), files = keys.len(), "Reading source files");

        let storage = self.root.storage.clone();
        let contents: Vec<(String, Vec<u8>)> = stream::iter(keys)
            .map(|key| {
                let storage = storage.clone();
                async move {
                    let data = storage.get_object(&key).await.map_err(|e| {
                        Error::Ingest(format!("Cannot read input file '{}': {}", key, e))
                    })?;
                    Ok::<_, Error>((key, data))
                }
            })
            .buffered(self.read_concurrency)
            .try_collect()
            .await?;

        let mut stats = SourceStats {
            files: contents.len(),
            ..SourceStats::default()
        };

        for (key, data) in contents {
            let mut file_malformed = 0usize;
            for (line_no, raw) in data.split(|b| *b == b'\n').enumerate() {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                let parsed = std::str::from_utf8(raw)
                    .map_err(|e| SchemaViolation::new(RECORD_FIELD, format!("invalid UTF-8: {}", e)))
                    .and_then(|line| {
                        if line.trim().is_empty() {
                            Ok(None)
                        } else {
                            parse_line(kind, line).map(Some)
                        }
                    });
                match parsed {
                    Ok(None) => {}
                    Ok(Some(record)) => {
                        stats.records += 1;
                        input.push(record);
                    }
                    Err(violation) => {
                        file_malformed += 1;
                        debug!(
                            file = %key,
                            line = line_no + 1,
                            field = %violation.field,
                            reason = %violation.reason,
                            "Skipping malformed record"
                        );
                    }
                }
            }

            if file_malformed > 0 {
                warn!(file = %key, malformed = file_malformed, "Skipped malformed records");
            }
            stats.malformed += file_malformed;
        }

        info!(
            source = kind.as_str(),
            records = stats.records,
            malformed = stats.malformed,
            "Parsed source"
        );
        input.stats.insert(kind, stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::s3::ObjectStorage;
    use crate::storage::store::ObjectStoreStorage;
    use std::sync::Arc;

    #[test]
    fn test_threshold_is_strict() {
        let stats = SourceStats {
            files: 1,
            records: 95,
            malformed: 5,
        };
        assert!(stats.check_threshold(SourceKind::Events, 0.05).is_ok());

        let stats = SourceStats {
            files: 1,
            records: 4,
            malformed: 6,
        };
        let err = stats.check_threshold(SourceKind::Events, 0.05).unwrap_err();
        assert!(matches!(err, Error::Ingest(_)));
        assert_eq!(SourceStats::default().malformed_fraction(), 0.0);
    }

    #[tokio::test]
    async fn test_read_source_counts_malformed_lines() {
        let storage = Arc::new(ObjectStoreStorage::in_memory());
        storage
            .put_object(
                "raw/log_data/2018-11-01-events.json",
                b"{\"ts\": 1541105830796, \"sessionId\": 1, \"page\": \"Home\"}\n\nnot json\n{\"ts\": 1541105830797, \"page\": \"Home\"}\n",
            )
            .await
            .unwrap();
        storage
            .put_object("raw/log_data/README.txt", b"ignored")
            .await
            .unwrap();

        let reader = RecordReader::new(StorageRoot::new(storage, "raw"), 2);
        let mut input = ParsedInput::default();
        reader
            .read_source(SourceKind::Events, "log_data", &mut input)
            .await
            .unwrap();

        assert_eq!(input.events.len(), 1);
        let stats = input.stats[&SourceKind::Events];
        assert_eq!(stats.files, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.malformed, 2);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_one_malformed_record() {
        let storage = Arc::new(ObjectStoreStorage::in_memory());
        let mut data = Vec::new();
        for ts in 0..99 {
            data.extend_from_slice(
                format!("{{\"ts\": {}, \"sessionId\": 1, \"page\": \"Home\"}}\r\n", ts).as_bytes(),
            );
        }
        data.extend_from_slice(b"{\"ts\": 1, \"page\": \"\xff\xfe\"}\n");
        storage
            .put_object("raw/log_data/events.json", &data)
            .await
            .unwrap();

        let reader = RecordReader::new(StorageRoot::new(storage, "raw"), 2);
        let mut input = ParsedInput::default();
        reader
            .read_source(SourceKind::Events, "log_data", &mut input)
            .await
            .unwrap();

        let stats = input.stats[&SourceKind::Events];
        assert_eq!(stats.records, 99);
        assert_eq!(stats.malformed, 1);
        assert!(input.check_thresholds(0.05).is_ok());
    }

    #[tokio::test]
    async fn test_missing_source_is_ingest_failure() {
        let storage = Arc::new(ObjectStoreStorage::in_memory());
        let reader = RecordReader::new(StorageRoot::new(storage, "raw"), 2);
        let mut input = ParsedInput::default();
        let err = reader
            .read_source(SourceKind::Catalog, "song_data", &mut input)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingest(_)));
    }
}
