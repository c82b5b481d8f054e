//! Version parsing and ordering for release tags
//!
//! Tags are normalized into a numeric release sequence, an optional prerelease
//! segment and an optional local build tag (usually a commit hash). Tags that do
//! not fit that shape are ordered with a natural (numeric-aware) comparison so
//! that [`compare`] never fails.
//!
//! # Examples
//!
//! ```rust
//! use std::cmp::Ordering;
//! use release_fetcher::app::version::{compare, expected_next_version};
//!
//! assert_eq!(compare("2.3.0", "2.3.0.rc1"), Ordering::Greater);
//! assert_eq!(compare("v2.3.0.alpha1", "2.3.0.beta1"), Ordering::Less);
//! assert_eq!(expected_next_version("v2.7.13.abcdef1").as_deref(), Some("2.7.14"));
//! ```

use std::cmp::Ordering;
use std::fmt;

/// Prerelease kinds in ascending precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreReleaseKind {
    Dev,
    Alpha,
    Beta,
    Rc,
}

impl PreReleaseKind {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "dev" => Some(PreReleaseKind::Dev),
            "alpha" | "a" => Some(PreReleaseKind::Alpha),
            "beta" | "b" => Some(PreReleaseKind::Beta),
            "rc" | "c" | "pre" | "preview" => Some(PreReleaseKind::Rc),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PreReleaseKind::Dev => "dev",
            PreReleaseKind::Alpha => "alpha",
            PreReleaseKind::Beta => "beta",
            PreReleaseKind::Rc => "rc",
        }
    }
}

/// Prerelease segment: kind plus ordinal (`rc2` is `(Rc, 2)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    pub kind: PreReleaseKind,
    pub ordinal: u64,
}

/// Comparable form of a release tag
#[derive(Debug, Clone)]
pub struct NormalizedVersion {
    release: Vec<u64>,
    pre: Option<PreRelease>,
    local: Option<String>,
}

impl NormalizedVersion {
    /// Numeric release segments as parsed (no padding)
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<PreRelease> {
        self.pre
    }

    /// Local build tag, lowercased
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Dotted numeric release, e.g. `2.7.13`
    pub fn base_version(&self) -> String {
        self.release
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    fn release_cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (0..len)
            .map(|i| {
                let a = self.release.get(i).copied().unwrap_or(0);
                let b = other.release.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Ord for NormalizedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release_cmp(other)
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // final release sorts above any prerelease of the same base
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for NormalizedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NormalizedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NormalizedVersion {}

impl fmt::Display for NormalizedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_version())?;
        if let Some(pre) = self.pre {
            write!(f, "-{}{}", pre.kind.as_str(), pre.ordinal)?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{}", local)?;
        }
        Ok(())
    }
}

fn strip_prefix(tag: &str) -> &str {
    let trimmed = tag.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn is_local_tag(token: &str) -> bool {
    token.len() >= 6 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Split `rc1`, `beta`, `0rc1` style tokens into (leading digits, keyword, ordinal)
fn split_prerelease_token(token: &str) -> Option<(Option<&str>, PreReleaseKind, Option<&str>)> {
    let digits_end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    let (leading, rest) = token.split_at(digits_end);
    let keyword_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (keyword, ordinal) = rest.split_at(keyword_end);

    if keyword.is_empty() || !(ordinal.is_empty() || is_digits(ordinal)) {
        return None;
    }

    let kind = PreReleaseKind::from_keyword(keyword)?;
    let leading = (!leading.is_empty()).then_some(leading);
    let ordinal = (!ordinal.is_empty()).then_some(ordinal);
    Some((leading, kind, ordinal))
}

/// Parse a tag into a [`NormalizedVersion`]
///
/// Returns `None` for empty input and for tags outside the
/// `<n>[.<n>...][<sep><pre>[<n>]][<sep><hex>|+<local>]` grammar.
pub fn normalize(tag: &str) -> Option<NormalizedVersion> {
    let stripped = strip_prefix(tag);
    if stripped.is_empty() {
        return None;
    }

    let (main, explicit_local) = match stripped.split_once('+') {
        Some((main, local)) => {
            let valid = !local.is_empty()
                && local
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
            if !valid {
                return None;
            }
            (main, Some(local.to_ascii_lowercase()))
        }
        None => (stripped, None),
    };

    let tokens: Vec<&str> = main.split(['.', '-']).collect();
    if tokens.iter().any(|t| t.is_empty()) {
        return None;
    }

    let mut release = Vec::new();
    let mut pre = None;
    let mut local = explicit_local;
    let mut index = 0;

    while index < tokens.len() && is_digits(tokens[index]) {
        release.push(tokens[index].parse::<u64>().ok()?);
        index += 1;
    }

    let trailing_hash = index + 1 == tokens.len() && is_local_tag(tokens[index]);

    // PEP 440 style "2.3.0rc1" keeps the last numeric segment glued to the keyword
    if index < tokens.len() && !trailing_hash {
        if let Some((leading, kind, ordinal)) = split_prerelease_token(tokens[index]) {
            if let Some(digits) = leading {
                release.push(digits.parse::<u64>().ok()?);
            }
            let mut ordinal = ordinal.map(str::parse::<u64>).transpose().ok()?;
            index += 1;
            if ordinal.is_none() && index < tokens.len() && is_digits(tokens[index]) {
                ordinal = Some(tokens[index].parse::<u64>().ok()?);
                index += 1;
            }
            pre = Some(PreRelease {
                kind,
                ordinal: ordinal.unwrap_or(0),
            });
        }
    }

    if release.is_empty() {
        return None;
    }

    if index < tokens.len() {
        let remaining = &tokens[index..];
        if local.is_some() || remaining.len() != 1 || !is_local_tag(remaining[0]) {
            return None;
        }
        local = Some(remaining[0].to_ascii_lowercase());
    }

    Some(NormalizedVersion {
        release,
        pre,
        local,
    })
}

#[derive(Debug, PartialEq, Eq)]
enum NaturalPart {
    Text(String),
    Number(String),
}

impl Ord for NaturalPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NaturalPart::Text(a), NaturalPart::Text(b)) => a.cmp(b),
            // numbers rank above words
            (NaturalPart::Text(_), NaturalPart::Number(_)) => Ordering::Less,
            (NaturalPart::Number(_), NaturalPart::Text(_)) => Ordering::Greater,
            (NaturalPart::Number(a), NaturalPart::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
        }
    }
}

impl PartialOrd for NaturalPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn natural_key(value: &str) -> Vec<NaturalPart> {
    let mut parts = Vec::new();
    let mut chars = value.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            let trimmed = digits.trim_start_matches('0');
            parts.push(NaturalPart::Number(if trimmed.is_empty() {
                "0".to_string()
            } else {
                trimmed.to_string()
            }));
        } else if c.is_alphabetic() {
            let mut word = String::new();
            while let Some(&w) = chars.peek().filter(|w| w.is_alphabetic()) {
                word.extend(w.to_lowercase());
                chars.next();
            }
            parts.push(NaturalPart::Text(word));
        } else {
            chars.next();
        }
    }

    parts
}

/// Numeric-aware lexical comparison
///
/// Digit runs compare by value, letter runs case-insensitively and other
/// characters are ignored; ties fall back to the raw strings so that distinct
/// inputs never compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a)
        .cmp(&natural_key(b))
        .then_with(|| a.trim().cmp(b.trim()))
}

/// Compare two tags
///
/// Both tags are compared structurally when both normalize; otherwise both
/// are compared with [`natural_cmp`].
pub fn compare(a: &str, b: &str) -> Ordering {
    match (normalize(a), normalize(b)) {
        (Some(left), Some(right)) => left.cmp(&right),
        _ => natural_cmp(a, b),
    }
}

/// Total sort key for tags
///
/// Unparsable tags order below every parsable one, so a mixed list still sorts
/// consistently.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionKey {
    Unparsed(Vec<NaturalPartKey>, String),
    Parsed(NormalizedVersion),
}

/// Opaque natural-sort component used by [`VersionKey`]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaturalPartKey(NaturalPart);

impl VersionKey {
    pub fn new(tag: &str) -> Self {
        match normalize(tag) {
            Some(version) => VersionKey::Parsed(version),
            None => VersionKey::Unparsed(
                natural_key(tag).into_iter().map(NaturalPartKey).collect(),
                tag.trim().to_string(),
            ),
        }
    }
}

/// Sort items newest first by the tag returned from `tag_of`
pub fn sort_newest_first<T, F>(items: &mut [T], tag_of: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by_cached_key(|item| std::cmp::Reverse(VersionKey::new(tag_of(item))));
}

/// Numeric base of a tag without prefix, prerelease or local tag
///
/// Falls back to the stripped tag when it has no leading numeric run.
pub fn extract_base_version(tag: &str) -> String {
    if let Some(version) = normalize(tag) {
        return version.base_version();
    }

    let stripped = strip_prefix(tag);
    let mut end = 0;
    let mut last_digit_end = 0;
    for (i, c) in stripped.char_indices() {
        if c.is_ascii_digit() {
            last_digit_end = i + 1;
        } else if c != '.' || last_digit_end != i {
            break;
        }
        end = i + 1;
    }

    if last_digit_end == 0 {
        stripped.to_string()
    } else {
        stripped[..last_digit_end.min(end)].to_string()
    }
}

/// Version expected to follow `tag` in a prerelease stream
///
/// The release is padded or truncated to three segments and its patch number
/// incremented: `2.7.13` gives `2.7.14`, `2.7` gives `2.7.1`.
pub fn expected_next_version(tag: &str) -> Option<String> {
    let base = extract_base_version(tag);
    let segments: Vec<u64> = base
        .split('.')
        .map(str::parse::<u64>)
        .collect::<Result<_, _>>()
        .ok()?;

    if segments.len() < 2 {
        return None;
    }

    let patch = segments.get(2).copied().unwrap_or(0);
    Some(format!(
        "{}.{}.{}",
        segments[0],
        segments[1],
        patch.checked_add(1)?
    ))
}
