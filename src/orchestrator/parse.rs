//! Parsing backend responses into proposed concepts and relationships
//!
//! Preferred form is JSON, optionally inside a fenced block:
//!
//! ```text
//! {"summary": "...",
//!  "concepts": [{"name": "Recency decay", "type": "method", "confidence": 0.8}],
//!  "relationships": [{"source": "page", "target": "Recency decay", "type": "defines"}]}
//! ```
//!
//! Otherwise lines shaped `A -> type -> B [0.8]` are read as relationships
//! and any remaining text as the summary. Anything else is kept whole as
//! the summary and proposes nothing.

use crate::graph::RelationshipType;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static RE_FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());

static RE_ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*]?\s*(.+?)\s*->\s*([A-Za-z_ -]+?)\s*->\s*(.+?)\s*(?:\[\s*([01]?(?:\.\d+)?)\s*\])?\s*$")
        .unwrap()
});

/// Names that denote the unit being enhanced
const UNIT_ALIASES: &[&str] = &["page", "this", "this page", "unit", "this unit"];

/// One side of a proposed relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// The page node of the unit being enhanced
    Unit,
    Concept(String),
}

impl Endpoint {
    fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_matches(|c| c == '"' || c == '\'');
        if name.is_empty() {
            return None;
        }
        if UNIT_ALIASES.contains(&name.to_lowercase().as_str()) {
            Some(Endpoint::Unit)
        } else {
            Some(Endpoint::Concept(name.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposedConcept {
    pub name: String,
    pub concept_type: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProposedRelationship {
    pub source: Endpoint,
    pub target: Endpoint,
    pub relationship: RelationshipType,
    pub confidence: f64,
}

/// Everything usable in one backend response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEnhancement {
    pub summary: Option<String>,
    pub concepts: Vec<ProposedConcept>,
    pub relationships: Vec<ProposedRelationship>,
}

impl ParsedEnhancement {
    /// Every concept named anywhere in the response, first mention wins
    pub fn mentioned_concepts(&self) -> Vec<ProposedConcept> {
        let mut out: Vec<ProposedConcept> = Vec::new();
        let mut push = |concept: ProposedConcept| {
            if !out.iter().any(|c| c.name.eq_ignore_ascii_case(&concept.name)) {
                out.push(concept);
            }
        };
        for concept in &self.concepts {
            push(concept.clone());
        }
        for rel in &self.relationships {
            for endpoint in [&rel.source, &rel.target] {
                if let Endpoint::Concept(name) = endpoint {
                    push(ProposedConcept {
                        name: name.clone(),
                        concept_type: None,
                        confidence: rel.confidence,
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    concepts: Vec<WireConcept>,
    #[serde(default)]
    relationships: Vec<WireRelationship>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireConcept {
    Name(String),
    Full {
        name: String,
        #[serde(rename = "type", default)]
        concept_type: Option<String>,
        #[serde(default)]
        confidence: Option<f64>,
    },
}

#[derive(Debug, Deserialize)]
struct WireRelationship {
    source: String,
    target: String,
    #[serde(rename = "type", alias = "relationship", default)]
    relationship: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a raw response; never fails, at worst yields a bare summary
pub fn parse_response(raw: &str, default_confidence: f64) -> ParsedEnhancement {
    if let Some(wire) = extract_json(raw) {
        return from_wire(wire, default_confidence);
    }
    parse_lines(raw, default_confidence)
}

fn extract_json(raw: &str) -> Option<WireResponse> {
    let mut candidates: Vec<&str> = RE_FENCED
        .captures_iter(raw)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            candidates.push(&raw[start..=end]);
        }
    }
    candidates
        .into_iter()
        .find_map(|c| serde_json::from_str::<WireResponse>(c.trim()).ok())
}

fn from_wire(wire: WireResponse, default_confidence: f64) -> ParsedEnhancement {
    let concepts = wire
        .concepts
        .into_iter()
        .filter_map(|c| {
            let (name, concept_type, confidence) = match c {
                WireConcept::Name(name) => (name, None, None),
                WireConcept::Full {
                    name,
                    concept_type,
                    confidence,
                } => (name, concept_type, confidence),
            };
            let name = name.trim().to_string();
            (!name.is_empty()).then(|| ProposedConcept {
                name,
                concept_type: concept_type.filter(|t| !t.trim().is_empty()),
                confidence: sanitize(confidence, default_confidence),
            })
        })
        .collect();

    let relationships = wire
        .relationships
        .into_iter()
        .filter_map(|r| {
            proposed(
                &r.source,
                r.relationship.as_deref().unwrap_or(""),
                &r.target,
                sanitize(r.confidence, default_confidence),
            )
        })
        .collect();

    ParsedEnhancement {
        summary: wire.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        concepts,
        relationships,
    }
}

fn parse_lines(raw: &str, default_confidence: f64) -> ParsedEnhancement {
    let mut relationships = Vec::new();
    let mut prose = Vec::new();
    for line in raw.lines() {
        match RE_ARROW.captures(line) {
            Some(caps) => {
                let confidence = caps.get(4).and_then(|m| m.as_str().parse::<f64>().ok());
                if let Some(rel) = proposed(
                    &caps[1],
                    &caps[2],
                    &caps[3],
                    sanitize(confidence, default_confidence),
                ) {
                    relationships.push(rel);
                }
            }
            None => prose.push(line),
        }
    }
    let summary = prose.join("\n").trim().to_string();
    ParsedEnhancement {
        summary: (!summary.is_empty()).then_some(summary),
        concepts: Vec::new(),
        relationships,
    }
}

/// Build a relationship; structural and unknown types become `relates_to`
fn proposed(
    source: &str,
    relationship: &str,
    target: &str,
    confidence: f64,
) -> Option<ProposedRelationship> {
    let source = Endpoint::from_name(source)?;
    let target = Endpoint::from_name(target)?;
    if source == target {
        return None;
    }
    let relationship = relationship
        .parse::<RelationshipType>()
        .ok()
        .filter(|r| !r.is_structural())
        .unwrap_or(RelationshipType::RelatesTo);
    Some(ProposedRelationship {
        source,
        target,
        relationship,
        confidence,
    })
}

fn sanitize(confidence: Option<f64>, default_confidence: f64) -> f64 {
    match confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => default_confidence,
    }
}
