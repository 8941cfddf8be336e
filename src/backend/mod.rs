//! Intelligence backends: the capability consumed during enhancement
//!
//! Abstracts over how a summarizing model is reached (subprocess, mock) so
//! the orchestrator depends only on `process(text, image?) -> String`.
//! Implementations are selected by [`BackendConfig`] at run start.

mod command;
mod mock;

pub use command::CommandBackend;
pub use mock::{MockBackend, MockCall};

use crate::config::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Reference to a rendered unit image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(PathBuf);

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Backend failure for one unit; recovered by the orchestrator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmProcessingError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A summarizing model
#[async_trait]
pub trait IntelligenceBackend: Send + Sync {
    /// Short name for logs and reports
    fn id(&self) -> &str;

    /// Whether `process` may be given an image
    fn supports_vision(&self) -> bool;

    /// Summarize a context window, optionally with the unit's image
    async fn process(
        &self,
        text: &str,
        image: Option<&ImageRef>,
    ) -> Result<String, LlmProcessingError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Mock,
    Command,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(BackendKind::Mock),
            "command" => Ok(BackendKind::Command),
            other => Err(ConfigError::Invalid(format!("unknown backend kind: {}", other))),
        }
    }
}

/// `backend:` section of the pipeline config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Program to spawn for the command backend
    pub command: Option<String>,
    pub args: Vec<String>,
    pub supports_vision: bool,
}

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == BackendKind::Command
            && self.command.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "backend.command is required when backend.kind is 'command'".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build(&self) -> Result<Arc<dyn IntelligenceBackend>, ConfigError> {
        self.validate()?;
        Ok(match self.kind {
            BackendKind::Mock => Arc::new(MockBackend::new().with_vision(self.supports_vision)),
            BackendKind::Command => {
                let program = self.command.clone().unwrap_or_default();
                Arc::new(
                    CommandBackend::new(program, self.args.clone())
                        .with_vision(self.supports_vision),
                )
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_selects_implementation() {
        let mock = BackendConfig::default().build().unwrap();
        assert_eq!(mock.id(), "mock");
        assert!(!mock.supports_vision());

        let command = BackendConfig {
            kind: BackendKind::Command,
            command: Some("summarize".into()),
            supports_vision: true,
            ..Default::default()
        }
        .build()
        .unwrap();
        assert_eq!(command.id(), "summarize");
        assert!(command.supports_vision());
    }

    #[test]
    fn command_kind_requires_program() {
        let config = BackendConfig {
            kind: BackendKind::Command,
            ..Default::default()
        };
        assert!(config.build().is_err());
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Command".parse::<BackendKind>().unwrap(), BackendKind::Command);
        assert!("http".parse::<BackendKind>().is_err());
    }
}
