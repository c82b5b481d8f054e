//! Local file verification
//!
//! A downloaded file is trusted when it has the expected size, its SHA-256
//! matches the published digest (or its `.sha256` sidecar), and, for zip
//! files, the archive opens and every entry passes its checksum.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use super::archive::is_zip_intact;
use super::atomic::{remove_stale_temp_files, write_atomic};
use crate::app::hash::Sha256Digest;
use crate::constants::files::{SHA256_SIDECAR_SUFFIX, ZIP_EXTENSION};

/// What a local file is expected to look like
#[derive(Debug, Clone, Default)]
pub struct ExpectedFile {
    pub size: Option<u64>,
    pub digest: Option<Sha256Digest>,
}

/// Result of checking a local file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCheck {
    Valid,
    Missing,
    SizeMismatch { actual: u64, expected: u64 },
    HashMismatch,
    CorruptArchive,
}

impl FileCheck {
    pub fn is_valid(self) -> bool {
        self == FileCheck::Valid
    }

    /// Present on disk but unusable
    pub fn needs_cleanup(self) -> bool {
        !matches!(self, FileCheck::Valid | FileCheck::Missing)
    }
}

/// `<file>.sha256` next to `path`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SHA256_SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Write `"<hex>  <basename>\n"` beside `path`
pub async fn write_sidecar(path: &Path, digest: &Sha256Digest) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content = format!("{}  {}\n", digest.to_hex(), file_name);
    write_atomic(&sidecar_path(path), content.as_bytes()).await
}

/// Digest recorded in the sidecar for `path`, if any
pub async fn read_sidecar(path: &Path) -> Option<Sha256Digest> {
    let content = fs::read_to_string(sidecar_path(path)).await.ok()?;
    let token = content.split_whitespace().next()?;
    Sha256Digest::from_hex(token).ok()
}

/// Compare `path` against `expected`, falling back to its sidecar
///
/// When neither a published digest nor a sidecar exists the current digest
/// is recorded and the file is accepted.
pub async fn verify_file(path: &Path, expected: Option<&Sha256Digest>) -> std::io::Result<bool> {
    let actual = Sha256Digest::of_file(path).await?;

    let reference = match expected {
        Some(digest) => Some(*digest),
        None => read_sidecar(path).await,
    };

    match reference {
        Some(reference) if reference != actual => {
            warn!(
                "SHA-256 mismatch for {}. Expected: {}, got: {}",
                path.display(),
                reference,
                actual
            );
            Ok(false)
        }
        Some(_) => {
            if expected.is_some() && read_sidecar(path).await != Some(actual) {
                write_sidecar(path, &actual).await?;
            }
            Ok(true)
        }
        None => {
            write_sidecar(path, &actual).await?;
            debug!("Recorded SHA-256 sidecar for {}", path.display());
            Ok(true)
        }
    }
}

fn is_zip(path: &Path) -> bool {
    path.to_string_lossy()
        .to_lowercase()
        .ends_with(ZIP_EXTENSION)
}

/// Full completeness check for one downloaded file
pub async fn check_file(path: &Path, expected: &ExpectedFile) -> FileCheck {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return FileCheck::Missing,
    };

    if let Some(expected_size) = expected.size.filter(|size| *size > 0) {
        if metadata.len() != expected_size {
            return FileCheck::SizeMismatch {
                actual: metadata.len(),
                expected: expected_size,
            };
        }
    }

    match verify_file(path, expected.digest.as_ref()).await {
        Ok(true) => {}
        Ok(false) => return FileCheck::HashMismatch,
        Err(e) => {
            warn!("Could not hash {}: {}", path.display(), e);
            return FileCheck::HashMismatch;
        }
    }

    if is_zip(path) {
        let zip_path = path.to_path_buf();
        let intact = tokio::task::spawn_blocking(move || is_zip_intact(&zip_path))
            .await
            .unwrap_or(false);
        if !intact {
            return FileCheck::CorruptArchive;
        }
    }

    FileCheck::Valid
}

/// Remove a bad file, its sidecar and leftover temp files
///
/// Returns true when the path is clear for a fresh download.
pub async fn prepare_for_redownload(path: &Path) -> bool {
    let mut clear = true;
    for target in [path.to_path_buf(), sidecar_path(path)] {
        match fs::remove_file(&target).await {
            Ok(()) => debug!("Removed {}", target.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Could not remove {}: {}", target.display(), e);
                clear = false;
            }
        }
    }
    remove_stale_temp_files(path).await;
    clear
}
