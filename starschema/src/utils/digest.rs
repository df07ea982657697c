use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(data.as_ref()))
}

/// First `len` hex characters of the SHA-256 of `data`.
pub fn sha256_prefix(data: impl AsRef<[u8]>, len: usize) -> String {
    let mut hex = sha256_hex(data);
    hex.truncate(len);
    hex
}
