use crate::models::TableKind;
use arrow::record_batch::RecordBatch;
use common::Result;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;

const CREATED_BY: &str = concat!("starschema ", env!("CARGO_PKG_VERSION"));

/// Writer settings for every data file. Nothing time- or host-dependent ends
/// up in the file, so equal batches encode to equal bytes.
pub fn writer_properties(table: TableKind) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_created_by(CREATED_BY.to_string())
        .set_key_value_metadata(Some(vec![KeyValue {
            key: "starschema.table".to_string(),
            value: Some(table.as_str().to_string()),
        }]))
        .build()
}

/// Encodes one batch as a complete Parquet file in memory.
pub fn encode_parquet(table: TableKind, batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(writer_properties(table)))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TableRow, TimeRow};
    use bytes::Bytes;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    #[test]
    fn test_encoding_is_deterministic() {
        let rows: Vec<TimeRow> = [1_541_105_830_796, 1_542_241_826_796]
            .into_iter()
            .filter_map(TimeRow::from_millis)
            .collect();
        let batch = TimeRow::to_record_batch(&rows.iter().collect::<Vec<_>>()).unwrap();

        let first = encode_parquet(TableKind::Time, &batch).unwrap();
        let second = encode_parquet(TableKind::Time, &batch).unwrap();
        assert_eq!(first, second);

        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(first))
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_empty_batch_encodes() {
        let batch = TimeRow::to_record_batch(&[]).unwrap();
        let bytes = encode_parquet(TableKind::Time, &batch).unwrap();
        assert!(bytes.starts_with(b"PAR1"));
    }
}
