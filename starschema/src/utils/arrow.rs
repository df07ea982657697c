use arrow::array::{Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use common::{Error, Result};

fn column_as(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<arrow::array::ArrayRef> {
    let idx = batch.schema().index_of(name)?;
    Ok(cast(batch.column(idx), data_type)?)
}

/// Reads a column as `Utf8`, whatever string encoding it arrived in
/// (DataFusion may hand back `Utf8View`).
pub fn string_column(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let array = column_as(batch, name, &DataType::Utf8)?;
    array
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| Error::Other(format!("Column {} is not a string column", name)))
}

pub fn int64_column(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    let array = column_as(batch, name, &DataType::Int64)?;
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| Error::Other(format!("Column {} is not an integer column", name)))
}

/// Collects a string column across batches, keeping nulls.
pub fn collect_strings(batches: &[RecordBatch], name: &str) -> Result<Vec<Option<String>>> {
    let mut values = Vec::new();
    for batch in batches {
        let array = string_column(batch, name)?;
        for i in 0..array.len() {
            values.push(if array.is_null(i) {
                None
            } else {
                Some(array.value(i).to_string())
            });
        }
    }
    Ok(values)
}
