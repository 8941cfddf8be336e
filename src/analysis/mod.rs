//! Deterministic document analysis: structure discovery and lexical content
//!
//! Nothing here calls an intelligence backend. [`StructureAnalyzer`] turns
//! a document into a TOC; [`ContentAnalyzer`] turns unit text into term
//! statistics, seed concepts and lexical relationship candidates.

mod content;
mod stem;
mod structure;
mod types;

pub use content::{
    AnalysisConfig, CandidateRelationship, ContentAnalysis, ContentAnalyzer, ReferenceTarget,
    SeedConcept, UnitCounts, UnitRef, UnitTerms,
};
pub use stem::{stem, tokenize, Token};
pub use structure::{detect_headings, Discovery, StructureAnalyzer};
pub use types::{StructureDiscoveryError, Toc, TocEntry, TocOrigin};
