//! Include/exclude matching for asset names and archive entries
//!
//! Include patterns without wildcards match as case-insensitive substrings
//! (`rak4631` selects `firmware-rak4631-2.7.13.zip`); patterns containing
//! `*`, `?` or `[` are case-insensitive globs. Exclude patterns are always globs.

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use crate::constants::limits::{MAX_PATTERN_QUESTION_MARKS, MAX_PATTERN_STARS};
use crate::errors::{ArchiveError, ArchiveResult};

#[derive(Debug, Clone)]
enum IncludePattern {
    Substring(String),
    Glob(GlobMatcher),
}

impl IncludePattern {
    fn matches(&self, name_lower: &str) -> bool {
        match self {
            IncludePattern::Substring(needle) => name_lower.contains(needle.as_str()),
            IncludePattern::Glob(matcher) => matcher.is_match(name_lower),
        }
    }
}

fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn compile_glob(pattern: &str) -> ArchiveResult<globset::Glob> {
    GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .build()
        .map_err(|e| ArchiveError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// Compiled include/exclude selection
#[derive(Debug, Clone)]
pub struct PatternFilter {
    include: Vec<IncludePattern>,
    exclude: GlobSet,
    exclude_count: usize,
}

impl PatternFilter {
    /// Compile a filter; blank patterns are ignored
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> ArchiveResult<Self> {
        let include = include
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| {
                if has_wildcards(p) {
                    compile_glob(p).map(|g| IncludePattern::Glob(g.compile_matcher()))
                } else {
                    Ok(IncludePattern::Substring(p.to_lowercase()))
                }
            })
            .collect::<ArchiveResult<Vec<_>>>()?;

        let mut builder = GlobSetBuilder::new();
        let mut exclude_count = 0;
        for pattern in exclude.iter().map(|p| p.as_ref().trim()).filter(|p| !p.is_empty()) {
            builder.add(compile_glob(pattern)?);
            exclude_count += 1;
        }
        let exclude = builder.build().map_err(|e| ArchiveError::InvalidPattern {
            pattern: "<exclude set>".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            include,
            exclude,
            exclude_count,
        })
    }

    /// Filter that accepts everything
    pub fn accept_all() -> Self {
        Self {
            include: Vec::new(),
            exclude: GlobSet::empty(),
            exclude_count: 0,
        }
    }

    pub fn has_include_patterns(&self) -> bool {
        !self.include.is_empty()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_count > 0 && self.exclude.is_match(name.to_lowercase())
    }

    /// Whether `name` is selected; an empty include list selects everything
    pub fn matches(&self, name: &str) -> bool {
        if self.is_excluded(name) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        let lower = name.to_lowercase();
        self.include.iter().any(|p| p.matches(&lower))
    }
}

/// Reject extraction patterns that are empty, path-like or overly broad
pub fn validate_extraction_pattern(pattern: &str) -> ArchiveResult<()> {
    let invalid = |reason: &str| ArchiveError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if pattern.contains(['/', '\\']) {
        return Err(invalid("patterns match file names and may not contain path separators"));
    }
    if pattern.matches('*').count() > MAX_PATTERN_STARS {
        return Err(invalid("too many '*' wildcards"));
    }
    if pattern.matches('?').count() > MAX_PATTERN_QUESTION_MARKS {
        return Err(invalid("too many '?' wildcards"));
    }
    compile_glob(pattern).map(|_| ())
}

/// Validate every include and exclude extraction pattern
pub fn validate_extraction_patterns<S: AsRef<str>>(include: &[S], exclude: &[S]) -> ArchiveResult<()> {
    include
        .iter()
        .chain(exclude.iter())
        .try_for_each(|p| validate_extraction_pattern(p.as_ref()))
}
