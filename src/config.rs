//! Pipeline configuration
//!
//! One immutable [`PipelineConfig`] value is loaded at start-up (YAML via
//! `serde_yaml`) and threaded through every constructor. Every field has a
//! default, so an empty file or no file at all yields a working setup.

use crate::analysis::AnalysisConfig;
use crate::backend::BackendConfig;
use crate::graph::NodeKind;
use crate::orchestrator::EnhancementConfig;
use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "docgraph";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scoring: ScoringConfig,
    pub analysis: AnalysisConfig,
    pub enhancement: EnhancementConfig,
    pub backend: BackendConfig,
    pub ontology: OntologyConfig,
}

impl PipelineConfig {
    /// Load and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Parse and validate YAML text; blank input yields the defaults
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// The config file from `--config`, else the per-user file if present,
    /// else the defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.analysis.validate()?;
        self.enhancement.validate()?;
        self.backend.validate()?;
        self.ontology.validate()
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// `<config_dir>/docgraph/config.yaml`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Ontology tags applied per node kind
///
/// Tags are opaque to the graph; they only flow into `ontology_tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OntologyConfig {
    pub document_tags: Vec<String>,
    pub section_tags: Vec<String>,
    pub page_tags: Vec<String>,
    pub concept_tags: Vec<String>,
    /// Concept types the backend may report; empty accepts any
    pub concept_types: Vec<String>,
}

impl Default for OntologyConfig {
    fn default() -> Self {
        Self {
            document_tags: vec!["document".into()],
            section_tags: vec!["section".into()],
            page_tags: vec!["page".into()],
            concept_tags: vec!["concept".into()],
            concept_types: Vec::new(),
        }
    }
}

impl OntologyConfig {
    pub fn tags_for(&self, kind: NodeKind) -> &[String] {
        match kind {
            NodeKind::Document => &self.document_tags,
            NodeKind::Section => &self.section_tags,
            NodeKind::Page => &self.page_tags,
            NodeKind::Concept => &self.concept_tags,
        }
    }

    /// Tag for a backend-reported concept type, if the type is allowed
    pub fn concept_type_tag(&self, concept_type: &str) -> Option<String> {
        let normalized = concept_type.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if self.concept_types.is_empty()
            || self.concept_types.iter().any(|t| t.eq_ignore_ascii_case(&normalized))
        {
            Some(normalized)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = self
            .document_tags
            .iter()
            .chain(&self.section_tags)
            .chain(&self.page_tags)
            .chain(&self.concept_tags)
            .chain(&self.concept_types);
        for tag in all {
            if tag.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "ontology tags must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}
