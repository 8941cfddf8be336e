//! Bounded context windows for backend calls
//!
//! A window is plain text with `## ` section headers, in this order:
//! document structure, related concepts, previous unit summary, unit
//! content. When the budget is exceeded, related concepts go first, then
//! the structure outline is truncated or dropped, and only then is the
//! unit content truncated. The carried summary has its own cap.

use crate::backend::ImageRef;

pub const STRUCTURE_HEADER: &str = "## Document structure";
pub const RELATED_HEADER: &str = "## Related concepts";
pub const SUMMARY_HEADER: &str = "## Previous unit summary";
pub const UNIT_CONTENT_HEADER: &str = "## Unit content";

/// Appended to any elided text
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Header line break plus the blank line after the body
const SECTION_OVERHEAD: usize = 3;

/// Inputs for one unit's window
#[derive(Debug, Clone, Default)]
pub struct ContextParts<'a> {
    pub outline: &'a str,
    pub related: &'a [String],
    pub previous_summary: Option<&'a str>,
    pub unit_text: &'a str,
    pub image: Option<ImageRef>,
}

/// What the backend is given for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    pub text: String,
    pub image: Option<ImageRef>,
    /// Headers of sections that were shortened or left out
    pub trimmed: Vec<&'static str>,
}

impl ContextWindow {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    budget_chars: usize,
    summary_carry_chars: usize,
}

impl ContextAssembler {
    pub fn new(budget_chars: usize, summary_carry_chars: usize) -> Self {
        Self {
            budget_chars,
            summary_carry_chars,
        }
    }

    pub fn assemble(&self, parts: ContextParts<'_>) -> ContextWindow {
        let mut trimmed = Vec::new();

        let summary_section = parts
            .previous_summary
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                let capped = truncate_chars(s, self.summary_carry_chars);
                if capped.len() != s.len() {
                    trimmed.push(SUMMARY_HEADER);
                }
                section(SUMMARY_HEADER, &capped)
            })
            .unwrap_or_default();

        let mut content_section = section(UNIT_CONTENT_HEADER, parts.unit_text.trim_end());
        let summary_len = char_len(&summary_section);
        if summary_len + char_len(&content_section) > self.budget_chars {
            let room = self
                .budget_chars
                .saturating_sub(summary_len + UNIT_CONTENT_HEADER.len() + SECTION_OVERHEAD);
            content_section = section(
                UNIT_CONTENT_HEADER,
                &truncate_chars(parts.unit_text.trim_end(), room),
            );
            trimmed.push(UNIT_CONTENT_HEADER);
        }

        let mut remaining = self
            .budget_chars
            .saturating_sub(summary_len + char_len(&content_section));

        let structure_section = if parts.outline.trim().is_empty() {
            String::new()
        } else {
            section(STRUCTURE_HEADER, parts.outline.trim_end())
        };
        let related_section = if parts.related.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = parts.related.iter().map(|r| format!("- {}", r)).collect();
            section(RELATED_HEADER, &list.join("\n"))
        };

        let mut text = String::new();
        if char_len(&structure_section) + char_len(&related_section) <= remaining {
            text.push_str(&structure_section);
            text.push_str(&related_section);
        } else {
            if !related_section.is_empty() {
                trimmed.push(RELATED_HEADER);
            }
            if char_len(&structure_section) <= remaining {
                text.push_str(&structure_section);
            } else if !structure_section.is_empty() {
                trimmed.push(STRUCTURE_HEADER);
                remaining = remaining.saturating_sub(STRUCTURE_HEADER.len() + SECTION_OVERHEAD);
                // an outline reduced to the marker alone is useless
                if remaining > TRUNCATION_MARKER.chars().count() {
                    text.push_str(&section(
                        STRUCTURE_HEADER,
                        &truncate_chars(parts.outline.trim_end(), remaining),
                    ));
                }
            }
        }
        text.push_str(&summary_section);
        text.push_str(&content_section);

        ContextWindow {
            text: text.trim_end().to_string(),
            image: parts.image,
            trimmed,
        }
    }
}

fn section(header: &str, body: &str) -> String {
    format!("{}\n{}\n\n", header, body)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// At most `max` chars, ending in the truncation marker when shortened
pub fn truncate_chars(text: &str, max: usize) -> String {
    if char_len(text) <= max {
        return text.to_string();
    }
    let marker_len = char_len(TRUNCATION_MARKER);
    if max <= marker_len {
        return TRUNCATION_MARKER.chars().take(max).collect();
    }
    let mut out: String = text.chars().take(max - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLINE: &str = "1 Intro (p. 1)\n2 Scoring (p. 2)\n  2.1 Decay (p. 3)";

    fn related() -> Vec<String> {
        vec!["Recency decay".into(), "Edge weight".into()]
    }

    fn parts<'a>(related: &'a [String], unit: &'a str) -> ContextParts<'a> {
        ContextParts {
            outline: OUTLINE,
            related,
            previous_summary: Some("Page one introduced scoring."),
            unit_text: unit,
            image: None,
        }
    }

    fn position(text: &str, header: &str) -> usize {
        text.find(header).unwrap()
    }

    #[test]
    fn generous_budget_keeps_every_section_in_order() {
        let related = related();
        let window = ContextAssembler::new(10_000, 500).assemble(parts(&related, "Body text."));
        let t = &window.text;
        assert!(position(t, STRUCTURE_HEADER) < position(t, RELATED_HEADER));
        assert!(position(t, RELATED_HEADER) < position(t, SUMMARY_HEADER));
        assert!(position(t, SUMMARY_HEADER) < position(t, UNIT_CONTENT_HEADER));
        assert!(t.ends_with("Body text."));
        assert!(window.trimmed.is_empty());
    }

    #[test]
    fn structure_is_trimmed_before_content() {
        let related = related();
        let unit = "x".repeat(100);
        // room for summary and content plus part of the outline
        let budget = 230;
        let window = ContextAssembler::new(budget, 500).assemble(parts(&related, &unit));

        assert!(window.char_count() <= budget);
        assert!(window.text.contains(STRUCTURE_HEADER));
        assert!(window.text.contains(TRUNCATION_MARKER));
        assert!(!window.text.contains(RELATED_HEADER));
        assert!(window.text.contains(&unit));
        assert!(window.trimmed.contains(&RELATED_HEADER));
        assert!(window.trimmed.contains(&STRUCTURE_HEADER));
        assert!(!window.trimmed.contains(&UNIT_CONTENT_HEADER));
    }

    #[test]
    fn oversized_content_is_truncated_last() {
        let related = related();
        let unit = "y".repeat(1_000);
        let budget = 300;
        let window = ContextAssembler::new(budget, 500).assemble(parts(&related, &unit));

        assert!(window.char_count() <= budget);
        assert!(!window.text.contains(STRUCTURE_HEADER));
        assert!(window.text.contains(SUMMARY_HEADER));
        assert!(window.text.ends_with(TRUNCATION_MARKER));
        assert!(window.trimmed.contains(&UNIT_CONTENT_HEADER));
    }

    #[test]
    fn summary_is_capped_separately() {
        let long_summary = "s".repeat(400);
        let window = ContextAssembler::new(10_000, 50).assemble(ContextParts {
            previous_summary: Some(&long_summary),
            unit_text: "body",
            ..Default::default()
        });
        let summary_body = window
            .text
            .split(SUMMARY_HEADER)
            .nth(1)
            .unwrap()
            .split(UNIT_CONTENT_HEADER)
            .next()
            .unwrap()
            .trim();
        assert_eq!(summary_body.chars().count(), 50);
        assert!(summary_body.ends_with(TRUNCATION_MARKER));
        assert_eq!(window.trimmed, vec![SUMMARY_HEADER]);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let window = ContextAssembler::new(1_000, 100).assemble(ContextParts {
            unit_text: "only content",
            ..Default::default()
        });
        assert_eq!(window.text, format!("{}\nonly content", UNIT_CONTENT_HEADER));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let text = "ééééééééééééééééééééé";
        let cut = truncate_chars(text, 15);
        assert_eq!(cut.chars().count(), 15);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(truncate_chars("short", 15), "short");
    }
}
