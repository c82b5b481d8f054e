//! Zip extraction with path-traversal protection
//!
//! Entries are selected by their base name, written below the destination
//! directory preserving their internal subdirectories, and rejected when the
//! resolved path would escape the destination. A rejected entry does not stop
//! the remaining entries from being extracted.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use super::atomic::temp_path_for;
use super::patterns::PatternFilter;
use crate::constants::files::{EXECUTABLE_EXTENSIONS, EXECUTABLE_PERMISSIONS};
use crate::errors::{ArchiveError, ArchiveResult};

/// Outcome of extracting one archive
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written by this extraction
    pub extracted: Vec<PathBuf>,
    /// Matching entries already present with the same size
    pub already_present: Vec<PathBuf>,
    /// Entry names refused because they escape the destination
    pub rejected: Vec<String>,
}

impl ExtractionReport {
    /// Nothing written because every matching entry already existed
    pub fn was_up_to_date(&self) -> bool {
        self.extracted.is_empty() && !self.already_present.is_empty()
    }
}

/// Resolve `entry_name` below `destination`
///
/// Absolute paths, drive prefixes, NUL bytes and `..` components that climb
/// above the destination are rejected with [`ArchiveError::PathTraversal`].
pub fn safe_join(destination: &Path, entry_name: &str) -> ArchiveResult<PathBuf> {
    let rejected = || ArchiveError::PathTraversal {
        entry: entry_name.to_string(),
    };

    if entry_name.is_empty() || entry_name.contains('\0') {
        return Err(rejected());
    }

    let normalized = entry_name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.split('/').next().is_some_and(|p| p.ends_with(':')) {
        return Err(rejected());
    }

    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(rejected());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(rejected()),
        }
    }

    if parts.is_empty() {
        return Err(rejected());
    }

    let resolved = parts
        .into_iter()
        .fold(destination.to_path_buf(), |path, part| path.join(part));
    if !resolved.starts_with(destination) {
        return Err(rejected());
    }
    Ok(resolved)
}

fn base_name(entry_name: &str) -> &str {
    entry_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_name)
}

/// Whether a file name gets the executable bit
pub fn is_executable_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    EXECUTABLE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Set the executable bits on `path` (no-op off Unix)
pub fn set_executable(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_PERMISSIONS))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, EXECUTABLE_PERMISSIONS);
    }
    Ok(())
}

fn corrupt(path: &Path, reason: impl ToString) -> ArchiveError {
    ArchiveError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn open_archive(archive_path: &Path) -> ArchiveResult<zip::ZipArchive<BufReader<File>>> {
    let file = File::open(archive_path)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive_path, e))
}

/// Extract entries whose base name passes `filter` into `destination`
///
/// Blocking; use [`extract_archive`] from async code.
pub fn extract_matching(
    archive_path: &Path,
    destination: &Path,
    filter: &PatternFilter,
) -> ArchiveResult<ExtractionReport> {
    let mut archive = open_archive(archive_path)?;
    let mut report = ExtractionReport::default();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| corrupt(archive_path, e))?;
        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let name = base_name(&entry_name);
        if name.is_empty() || !filter.matches(name) {
            continue;
        }

        let target = match safe_join(destination, &entry_name) {
            Ok(target) => target,
            Err(e) => {
                warn!("{} in {}", e, archive_path.display());
                report.rejected.push(entry_name);
                continue;
            }
        };

        if fs::metadata(&target).is_ok_and(|m| m.is_file() && m.len() == entry.size()) {
            debug!("Already extracted: {}", target.display());
            report.already_present.push(target);
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = temp_path_for(&target);
        let written = File::create(&temp_path).and_then(|mut out| {
            io::copy(&mut entry, &mut out)?;
            out.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            // read errors (bad CRC, truncated data) surface as InvalidData
            return Err(if e.kind() == io::ErrorKind::InvalidData {
                corrupt(archive_path, e)
            } else {
                ArchiveError::Io(e)
            });
        }
        fs::rename(&temp_path, &target).inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })?;

        if is_executable_name(name) {
            set_executable(&target)?;
            debug!("Marked executable: {}", target.display());
        }

        debug!("Extracted {} -> {}", entry_name, target.display());
        report.extracted.push(target);
    }

    if !report.extracted.is_empty() {
        info!(
            "Extracted {} file(s) from {}",
            report.extracted.len(),
            archive_path.display()
        );
    }
    Ok(report)
}

/// Async wrapper around [`extract_matching`]
pub async fn extract_archive(
    archive_path: PathBuf,
    destination: PathBuf,
    filter: PatternFilter,
) -> ArchiveResult<ExtractionReport> {
    tokio::task::spawn_blocking(move || extract_matching(&archive_path, &destination, &filter))
        .await
        .map_err(|e| ArchiveError::Io(io::Error::other(e)))?
}

/// Open the archive and read every entry to validate checksums
///
/// Blocking; a missing file counts as not intact.
pub fn is_zip_intact(archive_path: &Path) -> bool {
    let Ok(mut archive) = open_archive(archive_path) else {
        return false;
    };

    (0..archive.len()).all(|index| match archive.by_index(index) {
        Ok(mut entry) => io::copy(&mut entry, &mut io::sink()).is_ok(),
        Err(_) => false,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    /// Build an in-memory zip from `(name, content)` pairs
    pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
