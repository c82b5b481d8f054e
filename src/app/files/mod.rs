//! Local file operations
//!
//! - [`atomic`] - temp-file-plus-rename writes and JSON state helpers
//! - [`archive`] - traversal-safe zip extraction
//! - [`patterns`] - include/exclude name matching
//! - [`integrity`] - size, SHA-256 and archive checks

pub mod archive;
pub mod atomic;
pub mod integrity;
pub mod patterns;

pub use archive::{extract_archive, ExtractionReport};
pub use atomic::{read_json, write_atomic, write_json_atomic};
pub use integrity::{check_file, prepare_for_redownload, ExpectedFile, FileCheck};
pub use patterns::PatternFilter;
