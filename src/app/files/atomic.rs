//! Temp-file-plus-rename writes
//!
//! Every state file, cache document and downloaded asset reaches its final
//! path through a rename from a sibling temp file, so readers only ever see
//! a complete old file or a complete new one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::constants::files::TEMP_FILE_MARKER;
use crate::constants::limits::{ATOMIC_REPLACE_INITIAL_DELAY_MS, ATOMIC_REPLACE_RETRIES};
use crate::errors::{StateError, StateResult};

/// Retry policy for the final rename
#[derive(Debug, Clone, Copy)]
pub struct ReplacePolicy {
    /// Extra attempts after the first rename fails
    pub retries: u32,
    /// Delay before the first retry, doubled on each subsequent one
    pub initial_delay: Duration,
}

impl Default for ReplacePolicy {
    fn default() -> Self {
        Self {
            retries: ATOMIC_REPLACE_RETRIES,
            initial_delay: Duration::from_millis(ATOMIC_REPLACE_INITIAL_DELAY_MS),
        }
    }
}

/// Sibling temp path `<name>.tmp.<random>` for `final_path`
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let file_name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let suffix: String = std::iter::repeat_with(fastrand::alphanumeric)
        .take(8)
        .collect();
    final_path.with_file_name(format!("{}{}{}", file_name, TEMP_FILE_MARKER, suffix))
}

/// Rename `temp_path` over `final_path`, retrying transient failures
///
/// On final failure the temp file is removed and the last I/O error returned.
pub async fn replace_file(
    temp_path: &Path,
    final_path: &Path,
    policy: ReplacePolicy,
) -> std::io::Result<()> {
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        match fs::rename(temp_path, final_path).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                warn!(
                    "Replacing {} failed (attempt {}/{}): {}. Retrying in {:?}",
                    final_path.display(),
                    attempt,
                    policy.retries,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => {
                let _ = fs::remove_file(temp_path).await;
                return Err(e);
            }
        }
    }
}

/// Write `content` to `path` atomically, creating parent directories
pub async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = temp_path_for(path);
    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    replace_file(&temp_path, path, ReplacePolicy::default()).await
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StateResult<()> {
    let persistence = |reason: String| StateError::Persistence {
        path: path.to_path_buf(),
        reason,
    };

    let content = serde_json::to_vec_pretty(value).map_err(|e| persistence(e.to_string()))?;
    write_atomic(path, &content)
        .await
        .map_err(|e| persistence(e.to_string()))?;

    debug!("Persisted {}", path.display());
    Ok(())
}

/// Read a JSON state file
///
/// A missing file is `Ok(None)`; unreadable or unparsable content is
/// [`StateError::Corrupt`] so callers can rebuild from scratch.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StateResult<Option<T>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StateError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| StateError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Delete leftover `<name>.tmp.*` files next to `final_path`
///
/// Returns the number of files removed.
pub async fn remove_stale_temp_files(final_path: &Path) -> usize {
    let (Some(parent), Some(file_name)) = (final_path.parent(), final_path.file_name()) else {
        return 0;
    };
    let prefix = format!("{}{}", file_name.to_string_lossy(), TEMP_FILE_MARKER);

    let Ok(mut entries) = fs::read_dir(parent).await else {
        return 0;
    };

    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(&prefix)
            && fs::remove_file(entry.path()).await.is_ok()
        {
            debug!("Removed stale temp file {}", entry.path().display());
            removed += 1;
        }
    }
    removed
}
