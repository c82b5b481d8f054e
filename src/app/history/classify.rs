//! Channel and revocation detection from release text
//!
//! Both checks are pure functions of a release's tag, title and notes.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::app::client::Release;
use crate::app::static_regex;
use crate::app::version::extract_base_version;

static REVOKED_RX: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)\brevoked\b"));
static ALPHA_RX: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)\balpha\b"));
static BETA_RX: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)\bbeta\b"));
static PREVIOUS_RX: LazyLock<Regex> = LazyLock::new(|| static_regex(r"(?i)\bprevious(ly)?\b"));
static VERSION_RX: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\bv?(\d+\.\d+\.\d+)"));

/// Coarse release classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Alpha,
    Beta,
    #[default]
    Unspecified,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Alpha => "alpha",
            Channel::Beta => "beta",
            Channel::Unspecified => "unspecified",
        }
    }

    /// Label shown next to a tag; unspecified releases carry none
    pub fn label(self) -> Option<&'static str> {
        match self {
            Channel::Unspecified => None,
            other => Some(other.as_str()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn channel_in(text: &str) -> Option<Channel> {
    if ALPHA_RX.is_match(text) {
        Some(Channel::Alpha)
    } else if BETA_RX.is_match(text) {
        Some(Channel::Beta)
    } else {
        None
    }
}

/// Channel from the title (and tag) first, then from the notes
///
/// The tag is searched together with the title, so a `-beta` tag on an
/// untitled release is still classified. The body is only consulted when
/// neither names a channel.
pub fn detect_channel(tag: &str, title: &str, body: &str) -> Channel {
    let primary = format!("{} {}", title, tag);
    channel_in(&primary)
        .or_else(|| channel_in(body))
        .unwrap_or_default()
}

/// Whether a line mentions revocation of this release rather than an older one
fn line_revokes(line: &str, own_base: &str) -> bool {
    if !REVOKED_RX.is_match(line) || PREVIOUS_RX.is_match(line) {
        return false;
    }

    // a line naming some other version refers to that release
    !VERSION_RX
        .captures_iter(line)
        .any(|caps| caps.get(1).is_some_and(|m| m.as_str() != own_base))
}

/// Revocation marker in the title or any line of the notes
pub fn is_revoked(tag: &str, title: &str, body: &str) -> bool {
    let own_base = extract_base_version(tag);
    std::iter::once(title)
        .chain(body.lines())
        .any(|line| line_revokes(line, &own_base))
}

/// Channel and revocation state of one release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub channel: Channel,
    pub revoked: bool,
}

pub fn classify(release: &Release) -> Classification {
    Classification {
        channel: detect_channel(&release.tag_name, release.title(), release.notes()),
        revoked: is_revoked(&release.tag_name, release.title(), release.notes()),
    }
}

/// `v2.7.13 (beta, revoked)` style label for logs
pub fn release_label(release: &Release) -> String {
    let classification = classify(release);
    let mut parts = Vec::new();
    if let Some(channel) = classification.channel.label() {
        parts.push(channel);
    }
    if classification.revoked {
        parts.push("revoked");
    }

    if parts.is_empty() {
        release.tag_name.clone()
    } else {
        format!("{} ({})", release.tag_name, parts.join(", "))
    }
}
