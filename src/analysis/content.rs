//! ContentAnalyzer: deterministic lexical analysis of unit text
//!
//! Counts stems per unit, scores how concentrated each stem is in a unit
//! relative to the whole document, and proposes lexical relationships
//! between units: `relates_to` from shared significant vocabulary and
//! `references` from explicit cross-reference phrases.
//!
//! Counting ([`ContentAnalyzer::count_unit`]) is independent per unit and may
//! run in parallel; [`ContentAnalyzer::combine`] sorts its input, so the
//! outcome does not depend on completion order.

use super::stem::tokenize;
use super::types::Toc;
use crate::config::ConfigError;
use crate::graph::RelationshipType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::{debug, instrument};

static RE_PAGE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:see|cf\.|refer\s+to|compare)\s+(?:also\s+)?(?:page|p\.)\s*(\d{1,4})\b")
        .unwrap()
});

static RE_SECTION_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:see|cf\.|refer\s+to|compare|in)\s+(?:also\s+)?(?:section|chapter|§)\s*(\d{1,2}(?:\.\d{1,2})*)",
    )
    .unwrap()
});

/// Lexical analysis constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pseudo-count `m` pulling unit estimates toward the document prior
    pub prior_weight: f64,
    /// Minimum significance for a stem to characterize a unit
    pub min_significance: f64,
    pub max_terms_per_unit: usize,
    /// Minimum occurrences in the unit for a significant stem
    pub min_term_count: usize,
    /// Minimum co-occurrence score for a `relates_to` candidate
    pub min_cooccurrence: f64,
    /// Base score floor for explicit cross references
    pub reference_score: f64,
    pub seed_concepts_per_unit: usize,
    /// Confidence given to lexically seeded concept nodes
    pub seed_confidence: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            prior_weight: 10.0,
            min_significance: 0.6,
            max_terms_per_unit: 12,
            min_term_count: 2,
            min_cooccurrence: 0.15,
            reference_score: 0.8,
            seed_concepts_per_unit: 3,
            seed_confidence: 0.3,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.prior_weight > 0.0 && self.prior_weight.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "analysis.prior_weight must be positive, got {}",
                self.prior_weight
            )));
        }
        for (name, value) in [
            ("min_significance", self.min_significance),
            ("min_cooccurrence", self.min_cooccurrence),
            ("reference_score", self.reference_score),
            ("seed_confidence", self.seed_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "analysis.{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.max_terms_per_unit == 0 {
            return Err(ConfigError::Invalid(
                "analysis.max_terms_per_unit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A cross reference as written in the text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReferenceTarget {
    /// One-based page number
    Page(usize),
    /// Section number such as "2.1"
    Section(String),
}

/// Raw counts for one unit
#[derive(Debug, Clone, Default)]
pub struct UnitCounts {
    pub unit_index: usize,
    pub token_count: usize,
    pub frequencies: BTreeMap<String, usize>,
    /// Surface forms seen per stem, with counts
    pub surfaces: BTreeMap<String, BTreeMap<String, usize>>,
    pub references: BTreeSet<ReferenceTarget>,
}

/// A unit's analysed vocabulary
#[derive(Debug, Clone, Default)]
pub struct UnitTerms {
    pub unit_index: usize,
    pub token_count: usize,
    pub frequencies: BTreeMap<String, usize>,
    /// σ per stem present in the unit
    pub significance: BTreeMap<String, f64>,
    /// Characteristic stems, most significant first
    pub significant: Vec<(String, f64)>,
    /// Display label per stem: its most frequent surface form
    pub labels: BTreeMap<String, String>,
}

impl UnitTerms {
    pub fn label<'a>(&'a self, stem: &'a str) -> &'a str {
        self.labels.get(stem).map(String::as_str).unwrap_or(stem)
    }
}

/// Endpoint of a candidate relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitRef {
    /// A page, by unit index
    Unit(usize),
    /// A TOC entry, by entry index
    Section(usize),
}

/// A lexical edge proposal; never semantic
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRelationship {
    pub source: UnitRef,
    pub target: UnitRef,
    pub relationship: RelationshipType,
    pub base_score: f64,
}

/// A low-confidence concept proposed from a unit's vocabulary
#[derive(Debug, Clone, PartialEq)]
pub struct SeedConcept {
    pub unit_index: usize,
    pub stem: String,
    pub label: String,
    pub significance: f64,
}

/// Everything lexical analysis learned about the document
#[derive(Debug, Clone, Default)]
pub struct ContentAnalysis {
    pub units: Vec<UnitTerms>,
    pub document_frequencies: BTreeMap<String, usize>,
    pub total_tokens: usize,
    pub candidates: Vec<CandidateRelationship>,
    pub seeds: Vec<SeedConcept>,
}

impl ContentAnalysis {
    pub fn unit(&self, unit_index: usize) -> Option<&UnitTerms> {
        self.units.iter().find(|u| u.unit_index == unit_index)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContentAnalyzer {
    config: AnalysisConfig,
}

impl ContentAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Count one unit; independent of every other unit
    pub fn count_unit(unit_index: usize, text: &str) -> UnitCounts {
        let mut counts = UnitCounts {
            unit_index,
            ..Default::default()
        };
        for token in tokenize(text) {
            counts.token_count += 1;
            *counts.frequencies.entry(token.stem.clone()).or_default() += 1;
            *counts
                .surfaces
                .entry(token.stem)
                .or_default()
                .entry(token.surface)
                .or_default() += 1;
        }
        for caps in RE_PAGE_REF.captures_iter(text) {
            if let Some(page) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                counts.references.insert(ReferenceTarget::Page(page));
            }
        }
        for caps in RE_SECTION_REF.captures_iter(text) {
            if let Some(number) = caps.get(1) {
                counts
                    .references
                    .insert(ReferenceTarget::Section(number.as_str().to_string()));
            }
        }
        counts
    }

    /// Sequential convenience over [`count_unit`](Self::count_unit) and
    /// [`combine`](Self::combine)
    pub fn analyze(&self, units: &[String], toc: &Toc) -> ContentAnalysis {
        let counts = units
            .iter()
            .enumerate()
            .map(|(i, text)| Self::count_unit(i, text))
            .collect();
        self.combine(counts, toc)
    }

    /// Score per-unit counts against the document and derive candidates
    #[instrument(skip_all, fields(units = counts.len()))]
    pub fn combine(&self, mut counts: Vec<UnitCounts>, toc: &Toc) -> ContentAnalysis {
        counts.sort_by_key(|c| c.unit_index);

        let mut document_frequencies: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_tokens = 0;
        for unit in &counts {
            total_tokens += unit.token_count;
            for (stem, count) in &unit.frequencies {
                *document_frequencies.entry(stem.clone()).or_default() += count;
            }
        }

        let units: Vec<UnitTerms> = counts
            .iter()
            .map(|c| self.score_unit(c, &document_frequencies, total_tokens))
            .collect();

        let mut candidates = self.cooccurrence_candidates(&units);
        self.add_reference_candidates(&counts, &units, toc, &mut candidates);
        let seeds = self.seed_concepts(&units);

        debug!(
            stems = document_frequencies.len(),
            tokens = total_tokens,
            candidates = candidates.len(),
            seeds = seeds.len(),
            "content analysis complete"
        );

        ContentAnalysis {
            units,
            document_frequencies,
            total_tokens,
            candidates,
            seeds,
        }
    }

    /// σ = p_u / (p_u + p_doc), with p_u smoothed toward p_doc
    pub fn significance(&self, count: usize, unit_tokens: usize, doc_count: usize, doc_tokens: usize) -> f64 {
        if doc_tokens == 0 || doc_count == 0 {
            return 0.0;
        }
        let m = self.config.prior_weight;
        let p_doc = doc_count as f64 / doc_tokens as f64;
        let p_unit = (count as f64 + m * p_doc) / (unit_tokens as f64 + m);
        p_unit / (p_unit + p_doc)
    }

    fn score_unit(
        &self,
        counts: &UnitCounts,
        document_frequencies: &BTreeMap<String, usize>,
        total_tokens: usize,
    ) -> UnitTerms {
        let significance: BTreeMap<String, f64> = counts
            .frequencies
            .iter()
            .map(|(stem, &count)| {
                let doc_count = document_frequencies.get(stem).copied().unwrap_or(0);
                let sigma = self.significance(count, counts.token_count, doc_count, total_tokens);
                (stem.clone(), sigma)
            })
            .collect();

        let mut significant: Vec<(String, f64)> = significance
            .iter()
            .filter(|(stem, sigma)| {
                **sigma >= self.config.min_significance
                    && counts.frequencies.get(stem.as_str()).copied().unwrap_or(0)
                        >= self.config.min_term_count
            })
            .map(|(stem, &sigma)| (stem.clone(), sigma))
            .collect();
        significant.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        significant.truncate(self.config.max_terms_per_unit);

        let labels = counts
            .surfaces
            .iter()
            .filter_map(|(stem, forms)| {
                // most frequent form; ties go to the alphabetically first
                let best = forms
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))?;
                Some((stem.clone(), best.0.clone()))
            })
            .collect();

        UnitTerms {
            unit_index: counts.unit_index,
            token_count: counts.token_count,
            frequencies: counts.frequencies.clone(),
            significance,
            significant,
            labels,
        }
    }

    /// Weighted Jaccard over the significant stems of two units
    pub fn cooccurrence(a: &UnitTerms, b: &UnitTerms) -> f64 {
        let a: BTreeMap<&str, f64> = a.significant.iter().map(|(s, v)| (s.as_str(), *v)).collect();
        let b: BTreeMap<&str, f64> = b.significant.iter().map(|(s, v)| (s.as_str(), *v)).collect();
        let mut shared = 0.0;
        let mut union = 0.0;
        for stem in a.keys().chain(b.keys()).collect::<BTreeSet<_>>() {
            let x = a.get(stem).copied().unwrap_or(0.0);
            let y = b.get(stem).copied().unwrap_or(0.0);
            shared += x.min(y);
            union += x.max(y);
        }
        if union == 0.0 {
            0.0
        } else {
            shared / union
        }
    }

    fn cooccurrence_candidates(&self, units: &[UnitTerms]) -> Vec<CandidateRelationship> {
        let mut candidates = Vec::new();
        for (i, a) in units.iter().enumerate() {
            for b in &units[i + 1..] {
                let score = Self::cooccurrence(a, b);
                if score > 0.0 && score >= self.config.min_cooccurrence {
                    candidates.push(CandidateRelationship {
                        source: UnitRef::Unit(a.unit_index),
                        target: UnitRef::Unit(b.unit_index),
                        relationship: RelationshipType::RelatesTo,
                        base_score: score.min(1.0),
                    });
                }
            }
        }
        candidates
    }

    /// `references` candidates from cross-reference phrases
    ///
    /// A page reference supersedes the `relates_to` candidate between the
    /// same two units.
    fn add_reference_candidates(
        &self,
        counts: &[UnitCounts],
        units: &[UnitTerms],
        toc: &Toc,
        candidates: &mut Vec<CandidateRelationship>,
    ) {
        let unit_count = counts.len();
        let terms_of = |index: usize| units.iter().find(|u| u.unit_index == index);

        for unit in counts {
            let from = unit.unit_index;
            let own_section = toc.section_for_unit(from);
            for reference in &unit.references {
                let (target, target_unit) = match reference {
                    ReferenceTarget::Page(page) => {
                        let Some(index) = page.checked_sub(1).filter(|i| *i < unit_count) else {
                            continue;
                        };
                        (UnitRef::Unit(index), index)
                    }
                    ReferenceTarget::Section(number) => {
                        let Some(entry) = toc.find_by_number(number) else {
                            continue;
                        };
                        if own_section == Some(entry) {
                            continue;
                        }
                        (UnitRef::Section(entry), toc.entries[entry].unit_index)
                    }
                };
                if target == UnitRef::Unit(from) {
                    continue;
                }

                let cooc = match (terms_of(from), terms_of(target_unit)) {
                    (Some(a), Some(b)) if target_unit != from => Self::cooccurrence(a, b),
                    _ => 0.0,
                };
                if let UnitRef::Unit(to) = target {
                    let pair = (from.min(to), from.max(to));
                    candidates.retain(|c| {
                        !(c.relationship == RelationshipType::RelatesTo
                            && (c.source, c.target) == (UnitRef::Unit(pair.0), UnitRef::Unit(pair.1)))
                    });
                }
                candidates.push(CandidateRelationship {
                    source: UnitRef::Unit(from),
                    target,
                    relationship: RelationshipType::References,
                    base_score: cooc.max(self.config.reference_score).min(1.0),
                });
            }
        }
    }

    fn seed_concepts(&self, units: &[UnitTerms]) -> Vec<SeedConcept> {
        units
            .iter()
            .flat_map(|unit| {
                unit.significant
                    .iter()
                    .take(self.config.seed_concepts_per_unit)
                    .map(move |(stem, sigma)| SeedConcept {
                        unit_index: unit.unit_index,
                        stem: stem.clone(),
                        label: unit.label(stem).to_string(),
                        significance: *sigma,
                    })
            })
            .collect()
    }
}
