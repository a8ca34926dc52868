//! Normalizer - Classification of Canonical Predictions
//!
//! ## Responsibilities
//!
//! - Apply per-camera match/unknown thresholds and the minimum-area rule
//! - Produce immutable `ClassifiedResult`s in prediction order
//! - Run the post-classification action-check policy hook
//!
//! Classification is a pure function of thresholds and input: the same
//! prediction classifies identically on every retry.

use crate::config_store::DetectConfig;
use crate::models::{round2, ClassifiedResult, RawPrediction, ResultBox};

/// Outcome of the external action-check policy hook for one result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Drop the result entirely
    Suppress,
    /// Keep the result; names of triggered checks are attached when
    /// non-empty
    Triggered(Vec<String>),
}

/// Camera-specific post-classification policy hook
pub trait ActionPolicy: Send + Sync {
    fn evaluate(&self, detect: &DetectConfig, result: &ClassifiedResult) -> CheckOutcome;
}

/// Default policy: nothing suppressed, nothing triggered
pub struct NoActionChecks;

impl ActionPolicy for NoActionChecks {
    fn evaluate(&self, _detect: &DetectConfig, _result: &ClassifiedResult) -> CheckOutcome {
        CheckOutcome::Triggered(Vec::new())
    }
}

/// Classify canonical predictions against a camera's thresholds.
///
/// Output order is the backend's prediction order; no re-sorting by
/// confidence.
pub fn classify(
    detect: &DetectConfig,
    predictions: &[RawPrediction],
    policy: &dyn ActionPolicy,
) -> Vec<ClassifiedResult> {
    predictions
        .iter()
        .filter_map(|prediction| {
            let confidence = round2(prediction.confidence * 100.0);

            let name = if confidence >= detect.unknown.confidence {
                prediction.label.to_lowercase()
            } else {
                "unknown".to_string()
            };

            let area = prediction.bounding_box.area();
            let is_match = name != "unknown"
                && confidence >= detect.match_.confidence
                && area >= detect.match_.min_area;

            let mut result = ClassifiedResult {
                name,
                confidence,
                is_match,
                bounding_box: ResultBox::from(prediction.bounding_box),
                checks: None,
            };

            match policy.evaluate(detect, &result) {
                CheckOutcome::Suppress => None,
                CheckOutcome::Triggered(checks) => {
                    if !checks.is_empty() {
                        result.checks = Some(checks);
                    }
                    Some(result)
                }
            }
        })
        .collect()
}
