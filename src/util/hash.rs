//! Content hashing for staged artifacts.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_changes_with_content() {
        assert_ne!(sha256_hex(b"[]\n"), sha256_hex(b"[ ]\n"));
    }
}
