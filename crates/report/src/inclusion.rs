//! Operator inclusion list parsing.
//!
//! The list arrives as one comma-separated string of dot paths, for example
//! `"network.dns, signatures"`. All whitespace is removed before splitting.

use std::fmt;
use tracing::warn;

/// A dot-separated location inside a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPath {
    raw: String,
    segments: Vec<String>,
}

impl ItemPath {
    /// Parse one token. Returns `None` for an empty token or a token with an
    /// empty segment (`"a..b"`, `".a"`).
    pub fn parse(token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        let segments: Vec<String> = token.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self {
            raw: token.to_string(),
            segments,
        })
    }

    /// Keys to descend through, outermost first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when the path has more than one segment.
    pub fn is_dotted(&self) -> bool {
        self.segments.len() > 1
    }

    /// The path as written in the setting.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered list of report locations to copy into the curated event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionSpec {
    items: Vec<ItemPath>,
}

impl InclusionSpec {
    /// Parse the raw setting. Malformed tokens are logged and dropped.
    pub fn parse(raw: &str) -> Self {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

        let mut items = Vec::new();
        for token in compact.split(',') {
            match ItemPath::parse(token) {
                Some(item) => items.push(item),
                None if token.is_empty() => {
                    warn!("items_to_include_in_report includes an empty item");
                }
                None => {
                    warn!(
                        "items_to_include_in_report item '{}' has an empty path segment",
                        token
                    );
                }
            }
        }

        Self { items }
    }

    /// Items in the order they appear in the setting.
    pub fn items(&self) -> &[ItemPath] {
        &self.items
    }

    /// Number of well-formed items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no well-formed item was given.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
