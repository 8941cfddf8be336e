//! Table-of-contents types shared by structure discovery and enhancement

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

/// Errors reading the document while discovering structure
///
/// Finding no structure is not an error; only an unreadable document is.
#[derive(Debug, Error)]
pub enum StructureDiscoveryError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("unit {index} unavailable: {reason}")]
    UnitUnavailable { index: usize, reason: String },

    #[error("malformed table of contents: {0}")]
    MalformedToc(String),
}

/// One TOC descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    /// 1 = top level
    pub level: u32,
    /// Zero-based index of the unit (page) the entry starts on
    pub unit_index: usize,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, level: u32, unit_index: usize) -> Self {
        Self {
            title: title.into(),
            level,
            unit_index,
        }
    }
}

/// Which rung of the fallback chain produced a TOC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TocOrigin {
    /// Embedded in the source
    Native,
    /// Synthesized from detected headings
    Headings,
    /// Single whole-document entry
    Minimal,
}

impl TocOrigin {
    pub fn confidence(&self) -> f64 {
        match self {
            TocOrigin::Native => 1.0,
            TocOrigin::Headings => 0.6,
            TocOrigin::Minimal => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TocOrigin::Native => "native",
            TocOrigin::Headings => "headings",
            TocOrigin::Minimal => "minimal",
        }
    }
}

/// An ordered outline; entries are sorted by `unit_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toc {
    pub entries: Vec<TocEntry>,
    pub origin: TocOrigin,
}

impl Toc {
    pub fn new(entries: Vec<TocEntry>, origin: TocOrigin) -> Self {
        Self { entries, origin }
    }

    /// The single "whole document" entry
    pub fn minimal() -> Self {
        Self::new(vec![TocEntry::new("Whole document", 1, 0)], TocOrigin::Minimal)
    }

    pub fn confidence(&self) -> f64 {
        self.origin.confidence()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the enclosing entry: the nearest previous entry with a lower level
    pub fn parent_of(&self, index: usize) -> Option<usize> {
        let level = self.entries.get(index)?.level;
        self.entries[..index].iter().rposition(|e| e.level < level)
    }

    /// Index of the innermost entry covering `unit_index`
    ///
    /// That is the last entry starting on or before the unit; `None` for
    /// front matter that precedes the first entry.
    pub fn section_for_unit(&self, unit_index: usize) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| e.unit_index <= unit_index)
    }

    /// Entry whose title is numbered `number` ("2", "2.1", "Chapter 2")
    pub fn find_by_number(&self, number: &str) -> Option<usize> {
        let number = number.trim_end_matches('.');
        self.entries.iter().position(|entry| {
            let title = entry.title.trim();
            let first = title.split_whitespace().next().unwrap_or("");
            if first.trim_end_matches('.') == number {
                return true;
            }
            let mut words = title.split_whitespace();
            matches!(
                (words.next(), words.next()),
                (Some(kw), Some(n))
                    if ["chapter", "section", "part"].contains(&kw.to_lowercase().as_str())
                        && n.trim_end_matches(['.', ':']) == number
            )
        })
    }

    /// Indented plain-text outline, one entry per line
    pub fn to_outline(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
            let _ = writeln!(out, "{}{} (p. {})", indent, entry.title, entry.unit_index + 1);
        }
        out
    }

    /// Whether the entries are usable for `unit_count` units
    ///
    /// Non-empty, every index in range, titles present, ordered by unit index.
    pub fn is_plausible(entries: &[TocEntry], unit_count: usize) -> bool {
        !entries.is_empty()
            && entries
                .iter()
                .all(|e| e.unit_index < unit_count && !e.title.trim().is_empty() && e.level > 0)
            && entries.windows(2).all(|w| w[0].unit_index <= w[1].unit_index)
    }
}
