//! Mock backend for tests and offline runs
//!
//! Scripted responses and failures are keyed by marker strings found in the
//! unit content. Without a matching script it answers with a heuristic
//! extraction of capitalized phrases, so a full pipeline run produces a
//! plausible graph without any model.

use super::{ImageRef, IntelligenceBackend, LlmProcessingError};
use crate::analysis::tokenize;
use crate::orchestrator::UNIT_CONTENT_HEADER;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HEURISTIC_CONCEPTS: usize = 5;
const HEURISTIC_CONFIDENCE: f64 = 0.6;

/// One recorded `process` call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub text: String,
    pub image: Option<ImageRef>,
}

#[derive(Debug, Clone)]
pub struct MockBackend {
    available: bool,
    vision: bool,
    delay: Option<Duration>,
    responses: Vec<(String, String)>,
    failures: Vec<String>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            available: true,
            vision: false,
            delay: None,
            responses: Vec::new(),
            failures: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails with `Unavailable`
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Answer with `response` when the unit content contains `marker`
    pub fn with_response(mut self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((marker.into(), response.into()));
        self
    }

    /// Fail when the unit content contains `marker`
    pub fn with_failure(mut self, marker: impl Into<String>) -> Self {
        self.failures.push(marker.into());
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_vision(mut self, vision: bool) -> Self {
        self.vision = vision;
        self
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn record(&self, text: &str, image: Option<&ImageRef>) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                text: text.to_string(),
                image: image.cloned(),
            });
        }
    }
}

#[async_trait]
impl IntelligenceBackend for MockBackend {
    fn id(&self) -> &str {
        "mock"
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn process(
        &self,
        text: &str,
        image: Option<&ImageRef>,
    ) -> Result<String, LlmProcessingError> {
        self.record(text, image);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available {
            return Err(LlmProcessingError::Unavailable(
                "mock backend configured as unavailable".to_string(),
            ));
        }

        let content = unit_content(text);
        if let Some(marker) = self.failures.iter().find(|m| content.contains(m.as_str())) {
            return Err(LlmProcessingError::InvocationFailed(format!(
                "mock failure for marker '{}'",
                marker
            )));
        }
        if let Some((_, response)) = self
            .responses
            .iter()
            .find(|(marker, _)| content.contains(marker.as_str()))
        {
            return Ok(response.clone());
        }
        Ok(heuristic_response(content))
    }
}

/// The unit-content section of a context window, or the whole text
fn unit_content(text: &str) -> &str {
    match text.rfind(UNIT_CONTENT_HEADER) {
        Some(pos) => &text[pos + UNIT_CONTENT_HEADER.len()..],
        None => text,
    }
}

/// Concepts from capitalized words, most frequent first
fn heuristic_response(content: &str) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for word in content.split(|c: char| !c.is_alphabetic()) {
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        // skip stop-words and short words via the lexical tokenizer
        if capitalized && tokenize(word).next().is_some() {
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(HEURISTIC_CONCEPTS);

    let names: Vec<&str> = ranked.iter().map(|(name, _)| name.as_str()).collect();
    let summary = if names.is_empty() {
        "No notable concepts.".to_string()
    } else {
        format!("Discusses {}.", names.join(", "))
    };
    let concepts: Vec<_> = names
        .iter()
        .map(|name| json!({ "name": name, "confidence": HEURISTIC_CONFIDENCE }))
        .collect();
    let relationships: Vec<_> = names
        .windows(2)
        .take(1)
        .map(|pair| json!({ "source": pair[0], "target": pair[1], "type": "relates_to" }))
        .collect();

    json!({
        "summary": summary,
        "concepts": concepts,
        "relationships": relationships,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_response_and_failure() {
        let backend = MockBackend::new()
            .with_response("alpha", "ALPHA SUMMARY")
            .with_failure("broken");

        assert_eq!(backend.process("the alpha page", None).await.unwrap(), "ALPHA SUMMARY");
        let err = backend.process("a broken page", None).await.unwrap_err();
        assert!(matches!(err, LlmProcessingError::InvocationFailed(_)));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn markers_only_match_unit_content() {
        let backend = MockBackend::new().with_failure("broken");
        let window = format!(
            "## Previous unit summary\nbroken things\n\n{}\nfine text",
            UNIT_CONTENT_HEADER
        );
        assert!(backend.process(&window, None).await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_backend_errors() {
        let err = MockBackend::unavailable().process("x", None).await.unwrap_err();
        assert!(matches!(err, LlmProcessingError::Unavailable(_)));
    }

    #[tokio::test]
    async fn heuristic_extracts_capitalized_words() {
        let reply = MockBackend::new()
            .process("Recency decay lowers Weight. Recency matters. The end.", None)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["concepts"][0]["name"], "Recency");
        assert_eq!(value["concepts"][1]["name"], "Weight");
        assert_eq!(value["concepts"].as_array().unwrap().len(), 2);
        assert_eq!(value["relationships"][0]["target"], "Weight");
    }

    #[tokio::test]
    async fn records_images() {
        let backend = MockBackend::new().with_vision(true);
        let image = ImageRef::new("/tmp/page-1.png");
        backend.process("text", Some(&image)).await.unwrap();
        assert_eq!(backend.calls()[0].image, Some(image));
    }
}
