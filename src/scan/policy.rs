use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::classifier::{ClassificationResult, UNKNOWN_LABEL};
use crate::db::models::{Freshness, ScanRecord};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.70;
pub const DEFAULT_FRESHNESS_THRESHOLD: f32 = 0.5;
pub const DEFAULT_FRESHNESS_SPECIES: &str = "Banana";

/// Final outcome of one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDecision {
    pub species: String,
    pub freshness: Option<Freshness>,
    pub confidence: f32,
}

impl ScanDecision {
    /// The history row for this decision, not yet assigned an id.
    pub fn to_record(&self, timestamp_ms: i64) -> ScanRecord {
        ScanRecord {
            id: None,
            fruit_name: self.species.clone(),
            freshness: self.freshness,
            confidence: self.confidence,
            timestamp: timestamp_ms,
            pinned: false,
        }
    }
}

/// Combines the species result with an optional freshness score.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    pub confidence_threshold: f32,
    pub freshness_threshold: f32,
    /// The one species the freshness model understands.
    pub freshness_species: String,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            freshness_threshold: DEFAULT_FRESHNESS_THRESHOLD,
            freshness_species: DEFAULT_FRESHNESS_SPECIES.to_string(),
        }
    }
}

impl DecisionPolicy {
    pub fn wants_freshness(&self, species: &ClassificationResult) -> bool {
        species.confidence >= self.confidence_threshold
            && species.label.eq_ignore_ascii_case(&self.freshness_species)
    }

    pub fn freshness_label(&self, score: f32) -> Freshness {
        if score < self.freshness_threshold {
            Freshness::Fresh
        } else {
            Freshness::Rotten
        }
    }

    /// `score_fn` runs only when the species is confident and supported.
    pub fn decide<F>(&self, species: ClassificationResult, score_fn: F) -> Result<ScanDecision>
    where
        F: FnOnce() -> Result<f32>,
    {
        // Written so a NaN confidence also lands here.
        if !(species.confidence >= self.confidence_threshold) {
            let confidence = if species.confidence.is_nan() {
                0.0
            } else {
                species.confidence
            };
            return Ok(ScanDecision {
                species: UNKNOWN_LABEL.to_string(),
                freshness: None,
                confidence,
            });
        }

        let freshness = if self.wants_freshness(&species) {
            Some(self.freshness_label(score_fn()?))
        } else {
            None
        };

        Ok(ScanDecision {
            species: species.label,
            freshness,
            confidence: species.confidence,
        })
    }
}
