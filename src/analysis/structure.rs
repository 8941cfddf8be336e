//! StructureAnalyzer: TOC discovery through a fallback chain
//!
//! 1. The source's native TOC
//! 2. Headings detected in the unit text (markdown, numbered, chapter and
//!    ALL-CAPS lines)
//! 3. A single "whole document" entry
//!
//! A rung is used only when it yields a plausible TOC; otherwise the next
//! one is tried. The chain always terminates in a usable TOC.

use super::types::{StructureDiscoveryError, Toc, TocEntry, TocOrigin};
use crate::source::StructureSource;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

static RE_NUMBERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}(?:\.\d{1,2})*)\.?\s+(\p{Lu}.{0,78})$").unwrap()
});

static RE_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:chapter|part|section)\s+(?:\d{1,3}|[ivxlc]{1,6})\b[.:]?(?:\s+\S.{0,70})?$")
        .unwrap()
});

/// Headings longer than this are treated as prose
const MAX_HEADING_CHARS: usize = 80;

/// More headings than this many per unit means the detector is misfiring
const MAX_HEADINGS_PER_UNIT: usize = 8;

/// TOC plus the unit text it was derived from
#[derive(Debug, Clone)]
pub struct Discovery {
    pub toc: Toc,
    pub units: Vec<String>,
}

impl Discovery {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructureAnalyzer;

impl StructureAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Read every unit and derive a TOC
    ///
    /// Fails only when the document itself cannot be read. A native TOC that
    /// cannot be loaded is a descent to the next rung, not an error.
    #[instrument(skip_all)]
    pub fn discover(
        &self,
        source: &dyn StructureSource,
    ) -> Result<Discovery, StructureDiscoveryError> {
        let unit_count = source.unit_count()?;
        let units = (0..unit_count)
            .map(|index| source.unit_text(index))
            .collect::<Result<Vec<_>, _>>()?;

        let native = match source.native_toc() {
            Ok(native) => native,
            Err(err) => {
                warn!(error = %err, "native TOC unreadable, falling back to heading detection");
                None
            }
        };

        let toc = self.discover_from_units(native, &units);
        info!(
            units = unit_count,
            entries = toc.len(),
            origin = toc.origin.as_str(),
            confidence = toc.confidence(),
            "structure discovered"
        );
        Ok(Discovery { toc, units })
    }

    /// The fallback chain over already-loaded units
    pub fn discover_from_units(&self, native: Option<Vec<TocEntry>>, units: &[String]) -> Toc {
        match native {
            Some(entries) if Toc::is_plausible(&entries, units.len()) => {
                return Toc::new(entries, TocOrigin::Native);
            }
            Some(entries) => {
                warn!(entries = entries.len(), "native TOC implausible, detecting headings");
            }
            None => debug!("no native TOC, detecting headings"),
        }

        if let Some(entries) = detect_headings(units) {
            if Toc::is_plausible(&entries, units.len()) {
                return Toc::new(entries, TocOrigin::Headings);
            }
        }
        warn!("no usable headings, using whole-document TOC");
        Toc::minimal()
    }
}

/// Synthesize TOC entries from headings found in the unit text
///
/// Returns `None` when the result is empty or too dense to be real headings.
pub fn detect_headings(units: &[String]) -> Option<Vec<TocEntry>> {
    let mut entries: Vec<TocEntry> = Vec::new();
    for (unit_index, text) in units.iter().enumerate() {
        for (level, title) in unit_headings(text) {
            entries.push(TocEntry::new(title, level, unit_index));
        }
    }

    drop_running_headers(&mut entries, units.len());
    entries.dedup_by(|b, a| normalize(&a.title) == normalize(&b.title));

    if entries.is_empty() || entries.len() > MAX_HEADINGS_PER_UNIT * units.len().max(1) {
        return None;
    }

    let min_level = entries.iter().map(|e| e.level).min().unwrap_or(1);
    for entry in &mut entries {
        entry.level = entry.level - min_level + 1;
    }
    Some(entries)
}

/// Headings in one unit, in text order, as (level, title)
fn unit_headings(text: &str) -> Vec<(u32, String)> {
    let markdown = MarkdownOutline::parse(text);

    let mut found = Vec::new();
    let mut offset = 0;
    for raw_line in text.split_inclusive('\n') {
        let line_range = offset..offset + raw_line.len();
        offset += raw_line.len();

        if markdown.in_code_block(line_range.start) {
            continue;
        }
        if let Some(heading) = markdown.heading_starting_in(&line_range) {
            found.push(heading);
            continue;
        }
        if let Some(heading) = classify_line(raw_line.trim()) {
            found.push(heading);
        }
    }
    found
}

/// Level and title of a plain-text heading line
fn classify_line(line: &str) -> Option<(u32, String)> {
    if line.is_empty() || line.starts_with('#') || line.chars().count() > MAX_HEADING_CHARS {
        return None;
    }
    if let Some(caps) = RE_NUMBERED.captures(line) {
        let title = caps.get(2).map_or("", |m| m.as_str());
        // numbered sentences, not headings
        if title.ends_with(['.', ',', ';']) {
            return None;
        }
        let level = caps.get(1).map_or(1, |m| m.as_str().split('.').count() as u32);
        return Some((level, line.to_string()));
    }
    if RE_CHAPTER.is_match(line) {
        return Some((1, line.to_string()));
    }
    if is_caps_heading(line) {
        return Some((1, line.to_string()));
    }
    None
}

/// Short line of upper-case words
fn is_caps_heading(line: &str) -> bool {
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3
        && line.split_whitespace().count() <= 8
        && line.chars().filter(|c| c.is_alphabetic()).all(char::is_uppercase)
        && !line.ends_with(['.', ',', ';'])
}

fn normalize(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Remove titles repeated on most units (page headers and footers)
fn drop_running_headers(entries: &mut Vec<TocEntry>, unit_count: usize) {
    if unit_count < 3 {
        return;
    }
    let mut units_per_title: HashMap<String, Vec<usize>> = HashMap::new();
    for entry in entries.iter() {
        let units = units_per_title.entry(normalize(&entry.title)).or_default();
        if units.last() != Some(&entry.unit_index) {
            units.push(entry.unit_index);
        }
    }
    let running: Vec<String> = units_per_title
        .into_iter()
        .filter(|(_, units)| units.len() >= 3 && units.len() * 2 > unit_count)
        .map(|(title, _)| title)
        .collect();
    if !running.is_empty() {
        debug!(count = running.len(), "dropping running headers");
        entries.retain(|e| !running.contains(&normalize(&e.title)));
    }
}

/// Markdown headings and code blocks of one unit, by byte offset
struct MarkdownOutline {
    headings: Vec<(usize, u32, String)>,
    code_blocks: Vec<Range<usize>>,
}

impl MarkdownOutline {
    fn parse(text: &str) -> Self {
        let mut headings = Vec::new();
        let mut code_blocks = Vec::new();
        let mut current: Option<(usize, u32, String)> = None;

        for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    current = Some((range.start, level as u32, String::new()));
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some((start, level, title)) = current.take() {
                        let title = title.trim().to_string();
                        if !title.is_empty() {
                            headings.push((start, level, title));
                        }
                    }
                }
                Event::Text(t) | Event::Code(t) => {
                    if let Some((_, _, title)) = current.as_mut() {
                        title.push_str(&t);
                    }
                }
                Event::Start(Tag::CodeBlock(_)) => code_blocks.push(range),
                _ => {}
            }
        }
        Self {
            headings,
            code_blocks,
        }
    }

    fn heading_starting_in(&self, line: &Range<usize>) -> Option<(u32, String)> {
        self.headings
            .iter()
            .find(|(start, _, _)| line.contains(start))
            .map(|(_, level, title)| (*level, title.clone()))
    }

    fn in_code_block(&self, offset: usize) -> bool {
        self.code_blocks.iter().any(|r| r.contains(&offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn plausible_native_toc_wins() {
        let native = vec![TocEntry::new("Intro", 1, 0), TocEntry::new("Body", 1, 1)];
        let toc = StructureAnalyzer::new()
            .discover_from_units(Some(native.clone()), &units(&["# Other", "text"]));
        assert_eq!(toc.origin, TocOrigin::Native);
        assert_eq!(toc.entries, native);
        assert_eq!(toc.confidence(), 1.0);
    }

    #[test]
    fn out_of_range_native_toc_falls_back_to_headings() {
        let native = vec![TocEntry::new("Intro", 1, 0), TocEntry::new("Ghost", 1, 9)];
        let toc = StructureAnalyzer::new().discover_from_units(
            Some(native),
            &units(&["1. Introduction\nSome text here.", "2. Method\nMore text."]),
        );
        assert_eq!(toc.origin, TocOrigin::Headings);
        assert_eq!(toc.confidence(), 0.6);
        assert_eq!(toc.entries[1], TocEntry::new("2. Method", 1, 1));
    }

    #[test]
    fn no_structure_gives_minimal_toc() {
        let toc = StructureAnalyzer::new()
            .discover_from_units(None, &units(&["just some prose.", "and more prose."]));
        assert_eq!(toc.origin, TocOrigin::Minimal);
        assert_eq!(toc.entries, vec![TocEntry::new("Whole document", 1, 0)]);
        assert_eq!(toc.confidence(), 0.2);
    }

    #[test]
    fn detects_markdown_and_numbered_levels() {
        let entries = detect_headings(&units(&[
            "## Overview\nintro text\n\n2.1 Recency Decay\nedges fade",
            "2.1.3 Linear Floor\nbody",
        ]))
        .unwrap();
        let levels: Vec<_> = entries.iter().map(|e| (e.title.as_str(), e.level)).collect();
        // markdown h2 and two-part numbering normalize to the top level
        assert_eq!(
            levels,
            vec![("Overview", 1), ("2.1 Recency Decay", 1), ("2.1.3 Linear Floor", 2)]
        );
    }

    #[test]
    fn detects_chapters_and_caps_lines() {
        let entries = detect_headings(&units(&[
            "Chapter 4: Results\nThe results were good.",
            "RELATED WORK\nOthers did things.",
        ]))
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Chapter 4: Results");
        assert_eq!(entries[1].unit_index, 1);
    }

    #[test]
    fn ignores_sentences_and_code() {
        let entries = detect_headings(&units(&[
            "12 Apples were eaten by the team.\n```\n# not a heading\n```\nplain",
        ]));
        assert!(entries.is_none());
    }

    #[test]
    fn running_headers_are_dropped() {
        let pages = units(&[
            "ACME REPORT\n1. Start\ntext",
            "ACME REPORT\nmore text",
            "ACME REPORT\n2. Finish\ntext",
            "ACME REPORT\nlast",
        ]);
        let entries = detect_headings(&pages).unwrap();
        let titles: Vec<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["1. Start", "2. Finish"]);
    }

    #[test]
    fn consecutive_duplicates_collapse() {
        let entries = detect_headings(&units(&["# Scope\n# Scope\nbody"])).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
