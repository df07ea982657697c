use arrow::datatypes::{DataType, Field, Schema};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field name reported when the record itself, not one field, is unusable.
pub const RECORD_FIELD: &str = "<record>";

/// A record failed to conform to its target schema. Recovered per record by
/// the caller: counted and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema violation on field '{field}': {reason}")]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Utf8(String),
    Int64(i64),
    Float64(f64),
}

/// A JSON object coerced field by field against an Arrow schema.
#[derive(Debug)]
pub struct DecodedRecord<'s> {
    schema: &'s Schema,
    values: Vec<FieldValue>,
}

impl<'s> DecodedRecord<'s> {
    fn get(&self, name: &str) -> &FieldValue {
        match self.schema.index_of(name) {
            Ok(idx) => &self.values[idx],
            Err(_) => &FieldValue::Null,
        }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        match self.get(name) {
            FieldValue::Utf8(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn required_string(&self, name: &str) -> Result<String, SchemaViolation> {
        self.string(name)
            .ok_or_else(|| SchemaViolation::new(name, "missing required field"))
    }

    pub fn int64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn required_int64(&self, name: &str) -> Result<i64, SchemaViolation> {
        self.int64(name)
            .ok_or_else(|| SchemaViolation::new(name, "missing required field"))
    }

    pub fn float64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            FieldValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn required_float64(&self, name: &str) -> Result<f64, SchemaViolation> {
        self.float64(name)
            .ok_or_else(|| SchemaViolation::new(name, "missing required field"))
    }
}

/// Decodes one raw line into a JSON object.
pub fn decode_line(line: &str) -> Result<Map<String, Value>, SchemaViolation> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(SchemaViolation::new(RECORD_FIELD, "expected a JSON object")),
        Err(e) => Err(SchemaViolation::new(RECORD_FIELD, format!("invalid JSON: {}", e))),
    }
}

/// Coerces every schema field of `object`. Fields not in the schema are ignored.
pub fn decode_record<'s>(
    object: &Map<String, Value>,
    schema: &'s Schema,
) -> Result<DecodedRecord<'s>, SchemaViolation> {
    let values = schema
        .fields()
        .iter()
        .map(|field| {
            let value = coerce(object.get(field.name()), field)?;
            if value == FieldValue::Null && !field.is_nullable() {
                return Err(SchemaViolation::new(field.name(), "missing required field"));
            }
            Ok(value)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedRecord { schema, values })
}

fn coerce(value: Option<&Value>, field: &Field) -> Result<FieldValue, SchemaViolation> {
    let value = match value {
        None | Some(Value::Null) => return Ok(FieldValue::Null),
        Some(v) => v,
    };
    let mismatch = |expected: &str| {
        SchemaViolation::new(
            field.name(),
            format!("expected {}, found {}", expected, type_name(value)),
        )
    };

    match field.data_type() {
        DataType::Utf8 => match value {
            Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
            Value::String(s) => Ok(FieldValue::Utf8(s.clone())),
            Value::Number(n) => Ok(FieldValue::Utf8(n.to_string())),
            _ => Err(mismatch("string")),
        },
        DataType::Int64 => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(FieldValue::Int64)
                .ok_or_else(|| mismatch("integer")),
            Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
                    .map(FieldValue::Int64)
                    .ok_or_else(|| mismatch("integer"))
            }
            _ => Err(mismatch("integer")),
        },
        DataType::Float64 => match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(FieldValue::Float64)
                .ok_or_else(|| mismatch("number")),
            Value::String(s) if s.trim().is_empty() => Ok(FieldValue::Null),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(FieldValue::Float64)
                .ok_or_else(|| mismatch("number")),
            _ => Err(mismatch("number")),
        },
        other => Err(SchemaViolation::new(
            field.name(),
            format!("unsupported target type {:?}", other),
        )),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("count", DataType::Int64, true),
            Field::new("score", DataType::Float64, true),
        ])
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_coerces_strings_and_numbers() {
        let schema = schema();
        let record = decode_record(
            &object(json!({"id": 42, "count": "7", "score": "1.5", "extra": true})),
            &schema,
        )
        .unwrap();
        assert_eq!(record.string("id").as_deref(), Some("42"));
        assert_eq!(record.int64("count"), Some(7));
        assert_eq!(record.float64("score"), Some(1.5));
    }

    #[test]
    fn test_integral_floats_are_integers() {
        let schema = schema();
        let record =
            decode_record(&object(json!({"id": "a", "count": 1541105830796.0})), &schema).unwrap();
        assert_eq!(record.int64("count"), Some(1541105830796));

        let err = decode_record(&object(json!({"id": "a", "count": 1.25})), &schema).unwrap_err();
        assert_eq!(err.field, "count");
    }

    #[test]
    fn test_missing_optional_fields_are_null() {
        let schema = schema();
        let record = decode_record(&object(json!({"id": "a", "score": ""})), &schema).unwrap();
        assert_eq!(record.int64("count"), None);
        assert_eq!(record.float64("score"), None);
    }

    #[test]
    fn test_missing_required_field_is_violation() {
        let schema = schema();
        let err = decode_record(&object(json!({"count": 1})), &schema).unwrap_err();
        assert_eq!(err, SchemaViolation::new("id", "missing required field"));

        let err = decode_record(&object(json!({"id": "  "})), &schema).unwrap_err();
        assert_eq!(err.field, "id");
    }

    #[test]
    fn test_type_mismatch_names_field() {
        let schema = schema();
        let err = decode_record(&object(json!({"id": "a", "score": [1]})), &schema).unwrap_err();
        assert_eq!(err.field, "score");
        assert_eq!(err.reason, "expected number, found array");
    }

    #[test]
    fn test_decode_line_rejects_non_objects() {
        assert!(decode_line(r#"{"id": "a"}"#).is_ok());
        assert_eq!(decode_line("[1, 2]").unwrap_err().field, RECORD_FIELD);
        assert_eq!(decode_line("{broken").unwrap_err().field, RECORD_FIELD);
    }
}
