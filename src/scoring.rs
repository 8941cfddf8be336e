//! EdgeScorer: three-factor edge weighting with recency decay
//!
//! `weight = base_score × semantic_multiplier × recency_factor`, clamped to
//! [0, 1] and zeroed below the confidence threshold. Age is counted in
//! logical processing steps, never wall-clock time, so a run is
//! reproducible regardless of how long the backend takes.

use crate::config::ConfigError;
use crate::graph::{Edge, KnowledgeGraph, RelationshipType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Scoring constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Boost applied to backend-proposed edges; must exceed 1.0
    pub semantic_multiplier: f64,
    /// Per-step exponential decay for decaying relationship types, in (0, 1]
    pub recency_decay_rate: f64,
    /// Scores strictly below this are stored as 0
    pub confidence_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            semantic_multiplier: 1.5,
            recency_decay_rate: 0.97,
            confidence_threshold: 0.1,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.semantic_multiplier > 1.0) || !self.semantic_multiplier.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "scoring.semantic_multiplier must be a finite value > 1.0, got {}",
                self.semantic_multiplier
            )));
        }
        if !(self.recency_decay_rate > 0.0 && self.recency_decay_rate <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scoring.recency_decay_rate must be in (0, 1], got {}",
                self.recency_decay_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "scoring.confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Outcome of one rescoring pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreUpdate {
    pub edges_scored: usize,
    /// Edges whose weight is now 0
    pub edges_retired: usize,
}

/// Computes edge weights; the only writer of `Edge::weight`
#[derive(Debug, Clone)]
pub struct EdgeScorer {
    config: ScoringConfig,
}

impl Default for EdgeScorer {
    fn default() -> Self {
        Self {
            config: ScoringConfig::default(),
        }
    }
}

impl EdgeScorer {
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// `decay_rate^age × (1 − strength_decay × age)`, floored at 0
    ///
    /// Types with `strength_decay == 0` never decay: their factor is 1 at
    /// every age.
    pub fn recency_factor(&self, age: u64, relationship: RelationshipType) -> f64 {
        let strength_decay = relationship.strength_decay();
        if strength_decay == 0.0 {
            return 1.0;
        }
        let age = age as f64;
        let linear = (1.0 - strength_decay * age).max(0.0);
        self.config.recency_decay_rate.powf(age) * linear
    }

    /// Clamped score before the confidence threshold is applied
    pub fn raw_score(
        &self,
        base_score: f64,
        is_semantic: bool,
        age: u64,
        relationship: RelationshipType,
    ) -> f64 {
        let multiplier = if is_semantic {
            self.config.semantic_multiplier
        } else {
            1.0
        };
        let raw = base_score * multiplier * self.recency_factor(age, relationship);
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }

    /// Effective weight for an edge with the given properties
    pub fn calculate_score(
        &self,
        base_score: f64,
        is_semantic: bool,
        age: u64,
        relationship: RelationshipType,
    ) -> f64 {
        let score = self.raw_score(base_score, is_semantic, age, relationship);
        if score < self.config.confidence_threshold {
            0.0
        } else {
            score
        }
    }

    pub fn score_edge(&self, edge: &Edge, current_step: u64) -> f64 {
        self.calculate_score(
            edge.base_score,
            edge.is_semantic,
            edge.age_at(current_step),
            edge.relationship_type,
        )
    }

    /// Recompute every edge's weight as of `current_step`
    pub fn update_edge_scores(&self, graph: &mut KnowledgeGraph, current_step: u64) -> ScoreUpdate {
        let mut update = ScoreUpdate::default();
        for edge in graph.edges_mut() {
            edge.weight = self.score_edge(edge, current_step);
            update.edges_scored += 1;
            if edge.is_retired() {
                update.edges_retired += 1;
            }
        }
        debug!(
            step = current_step,
            scored = update.edges_scored,
            retired = update.edges_retired,
            "edge scores updated"
        );
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scorer(threshold: f64) -> EdgeScorer {
        EdgeScorer::new(ScoringConfig {
            semantic_multiplier: 1.5,
            recency_decay_rate: 0.9,
            confidence_threshold: threshold,
        })
        .unwrap()
    }

    #[test]
    fn semantic_edge_at_age_zero_is_boosted() {
        let s = scorer(0.0);
        let weight = s.calculate_score(0.5, true, 0, RelationshipType::RelatesTo);
        assert!((weight - 0.75).abs() < 1e-12);
    }

    #[test]
    fn scores_below_threshold_are_exactly_zero() {
        let s = scorer(0.3);
        // 0.25 raw: lexical, no decay at age 0
        assert_eq!(s.calculate_score(0.25, false, 0, RelationshipType::RelatesTo), 0.0);
        assert_eq!(s.calculate_score(0.3, false, 0, RelationshipType::RelatesTo), 0.3);
    }

    #[test]
    fn scores_are_clamped_to_one() {
        let s = scorer(0.0);
        assert_eq!(s.calculate_score(0.9, true, 0, RelationshipType::Supports), 1.0);
    }

    #[test]
    fn contains_never_decays() {
        let s = scorer(0.1);
        for age in [0, 1, 10, 1_000, u64::MAX] {
            assert_eq!(s.calculate_score(1.0, false, age, RelationshipType::Contains), 1.0);
        }
    }

    #[test]
    fn linear_decay_bottoms_out_at_zero() {
        let s = scorer(0.0);
        // relates_to decays 0.05/step: gone after 20 steps
        assert_eq!(s.recency_factor(20, RelationshipType::RelatesTo), 0.0);
        assert_eq!(s.recency_factor(500, RelationshipType::RelatesTo), 0.0);
    }

    #[test]
    fn rejects_invalid_config() {
        let bad_multiplier = ScoringConfig {
            semantic_multiplier: 1.0,
            ..Default::default()
        };
        assert!(EdgeScorer::new(bad_multiplier).is_err());

        let bad_rate = ScoringConfig {
            recency_decay_rate: 0.0,
            ..Default::default()
        };
        assert!(bad_rate.validate().is_err());

        let bad_threshold = ScoringConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
    }

    fn any_relationship() -> impl Strategy<Value = RelationshipType> {
        prop::sample::select(RelationshipType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn weight_is_always_in_unit_interval(
            base in -2.0f64..3.0,
            semantic in any::<bool>(),
            age in 0u64..10_000,
            rel in any_relationship(),
            threshold in 0.0f64..=1.0,
        ) {
            let w = scorer(threshold).calculate_score(base, semantic, age, rel);
            prop_assert!((0.0..=1.0).contains(&w));
        }

        #[test]
        fn weight_is_non_increasing_with_age(
            base in 0.0f64..=1.0,
            semantic in any::<bool>(),
            age in 0u64..200,
            rel in any_relationship(),
        ) {
            let s = scorer(0.1);
            let now = s.calculate_score(base, semantic, age, rel);
            let later = s.calculate_score(base, semantic, age + 1, rel);
            prop_assert!(later <= now);
        }
    }
}
