//! Compact SHA-256 digest type
//!
//! Digests are stored as their raw 32-byte representation and rendered as
//! lowercase hex for sidecar files, logs and JSON.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::constants::files::HASH_BUFFER_SIZE;
use crate::errors::{DownloadError, TransferResult};

/// SHA-256 digest stored as a 32-byte array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Create a digest from a hex string
    ///
    /// Accepts an optional `sha256:` prefix as published by forge asset metadata.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use release_fetcher::app::Sha256Digest;
    ///
    /// let digest = Sha256Digest::from_hex(
    ///     "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
    /// )?;
    /// assert_eq!(digest, Sha256Digest::of_bytes(b""));
    /// # Ok::<(), release_fetcher::errors::DownloadError>(())
    /// ```
    pub fn from_hex(value: &str) -> TransferResult<Self> {
        let trimmed = value.trim();
        let hex_part = trimmed
            .strip_prefix("sha256:")
            .or_else(|| trimmed.strip_prefix("SHA256:"))
            .unwrap_or(trimmed);

        let invalid = || DownloadError::InvalidDigest {
            value: value.to_string(),
        };

        if hex_part.len() != 64 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| invalid())?;
        Ok(Sha256Digest(bytes))
    }

    /// Wrap an already computed digest
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Sha256Digest(bytes)
    }

    /// Digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        Sha256Digest(Sha256::digest(data).into())
    }

    /// Stream a file from disk and compute its digest
    pub async fn of_file(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(Sha256Digest(hasher.finalize().into()))
    }

    /// Lowercase 64-character hex representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Serialize as a hex string for JSON compatibility
impl Serialize for Sha256Digest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        Self::from_hex(&hex_string).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_known_digests() {
        assert_eq!(Sha256Digest::of_bytes(b"").to_hex(), EMPTY);
        assert_eq!(Sha256Digest::of_bytes(b"hello").to_hex(), HELLO);
    }

    #[test]
    fn test_prefix_and_case_insensitive() {
        let plain = Sha256Digest::from_hex(HELLO).unwrap();
        let prefixed = Sha256Digest::from_hex(&format!("sha256:{}", HELLO)).unwrap();
        let upper = Sha256Digest::from_hex(&HELLO.to_uppercase()).unwrap();

        assert_eq!(plain, prefixed);
        assert_eq!(plain, upper);
        assert_eq!(upper.to_hex(), HELLO);
    }

    #[test]
    fn test_invalid_hex_strings() {
        let invalid_cases = [
            "",
            "sha256:",
            &HELLO[..63],
            "zz24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            "md5:50c9d1c465f3cbff652be1509c2e2a4e",
        ];

        for value in invalid_cases {
            assert!(
                Sha256Digest::from_hex(value).is_err(),
                "Should reject: {}",
                value
            );
        }
    }

    #[tokio::test]
    async fn test_file_digest_matches_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("asset.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let from_file = Sha256Digest::of_file(&path).await.unwrap();
        assert_eq!(from_file, Sha256Digest::of_bytes(&data));
    }

    #[test]
    fn test_serialization() {
        let digest = Sha256Digest::from_hex(HELLO).unwrap();
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO));

        let back: Sha256Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
        assert_eq!(std::mem::size_of::<Sha256Digest>(), 32);
    }
}
