use common::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Display;

static PARTITION_SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)=(?P<value>[A-Za-z0-9_.+\-]+)$")
        .expect("Invalid partition segment regex")
});

/// Hive-style partition directory, e.g. `year=2018/month=11`.
/// An empty path is the table root (unpartitioned tables).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionPath {
    segments: Vec<(String, String)>,
}

impl PartitionPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: impl Display) -> Self {
        self.segments.push((name.to_string(), value.to_string()));
        self
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn build_storage_path(&self) -> String {
        self.segments
            .iter()
            .map(|(name, value)| format!("{}={}", name, escape_value(value)))
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn build_file_path(&self, filename: &str) -> String {
        if self.is_root() {
            filename.to_string()
        } else {
            format!("{}/{}", self.build_storage_path(), filename)
        }
    }

    /// Parses the directory part produced by [`Self::build_storage_path`].
    pub fn parse(path: &str) -> Result<Self> {
        let mut partition = Self::root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let caps = PARTITION_SEGMENT_REGEX.captures(segment).ok_or_else(|| {
                Error::InvalidInput(format!("Not a partition segment: '{}'", segment))
            })?;
            let value = unescape_value(&caps["value"])?;
            partition = partition.with_value(&caps["name"], value);
        }
        Ok(partition)
    }
}

impl Display for PartitionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.build_storage_path())
        }
    }
}

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-')
}

/// Escapes a partition value so it is a valid single key segment on every
/// backend: bytes outside `[A-Za-z0-9_.-]` become `+XX`.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        if is_safe(byte) {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("+{:02X}", byte));
        }
    }
    escaped
}

pub fn unescape_value(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'+' {
            let hex = value
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::InvalidInput(format!("Truncated escape in '{}'", value)))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::InvalidInput(format!("Bad escape in '{}'", value)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(String::from_utf8(out)?)
}
