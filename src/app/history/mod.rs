//! Release and prerelease lifecycle tracking
//!
//! - [`classify`] - Channel and revocation detection from release text
//! - [`release`] - Per-family history of every tag seen in the live listing
//! - [`prerelease`] - Loose-file prerelease directories reconstructed from commits

pub mod classify;
pub mod prerelease;
pub mod release;

pub use classify::{classify, detect_channel, is_revoked, release_label, Channel, Classification};
pub use prerelease::{
    build_history, parse_prerelease_directory, summarize, PrereleaseDirectoryEntry,
    PrereleaseHistoryBuilder, PrereleaseId, PrereleaseStatus, PrereleaseSummary,
};
pub use release::{HistorySnapshot, ReleaseHistoryEntry, ReleaseHistoryTracker, ReleaseStatus};
