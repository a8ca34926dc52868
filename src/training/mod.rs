//! TrainingService - Subject Registration Across Backends
//!
//! ## Responsibilities
//!
//! - Fan `train` / `remove` over every configured backend
//! - Per-backend failure isolation: one backend's refusal never aborts the
//!   others

use crate::detectors::DetectorRegistry;
use crate::models::round2;
use futures::future::join_all;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Per-backend acknowledgement of a train or remove call
#[derive(Debug, Clone, Serialize)]
pub struct TrainOutcome {
    pub detector: String,
    pub success: bool,
    /// HTTP status when the backend answered
    pub status: Option<u16>,
    /// Call duration in seconds, two decimals
    pub duration: f64,
}

/// TrainingService instance
pub struct TrainingService {
    registry: DetectorRegistry,
}

impl TrainingService {
    pub fn new(registry: DetectorRegistry) -> Self {
        Self { registry }
    }

    /// Register a labeled face image with every backend
    pub async fn train(&self, subject: &str, image_path: &Path) -> Vec<TrainOutcome> {
        let calls = self.registry.values().map(|detector| async move {
            let started = Instant::now();
            let result = detector.train(subject, image_path).await;
            (detector.name().to_string(), started.elapsed(), result)
        });

        let mut outcomes = Vec::new();
        for (name, elapsed, result) in join_all(calls).await {
            let outcome = match result {
                Ok(raw) => {
                    let success = (200..300).contains(&raw.status);
                    if success {
                        tracing::info!(detector = %name, subject = %subject, "Subject trained");
                    } else {
                        tracing::warn!(
                            detector = %name,
                            subject = %subject,
                            status = raw.status,
                            "Training rejected"
                        );
                    }
                    TrainOutcome {
                        detector: name,
                        success,
                        status: Some(raw.status),
                        duration: round2(elapsed.as_secs_f64()),
                    }
                }
                Err(e) => {
                    tracing::error!(detector = %name, subject = %subject, error = %e, "Training failed");
                    TrainOutcome {
                        detector: name,
                        success: false,
                        status: None,
                        duration: round2(elapsed.as_secs_f64()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Delete a trained subject from every backend
    pub async fn remove(&self, subject: &str) -> Vec<TrainOutcome> {
        let calls = self.registry.values().map(|detector| async move {
            let started = Instant::now();
            let result = detector.remove(subject).await;
            (detector.name().to_string(), started.elapsed(), result)
        });

        let mut outcomes = Vec::new();
        for (name, elapsed, result) in join_all(calls).await {
            let outcome = match result {
                Ok(raw) => TrainOutcome {
                    detector: name,
                    success: (200..300).contains(&raw.status),
                    status: Some(raw.status),
                    duration: round2(elapsed.as_secs_f64()),
                },
                Err(e) => {
                    tracing::error!(detector = %name, subject = %subject, error = %e, "Remove failed");
                    TrainOutcome {
                        detector: name,
                        success: false,
                        status: None,
                        duration: round2(elapsed.as_secs_f64()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::Detector;
    use crate::error::{Error, Result};
    use crate::models::{DetectionEvent, PixelBox, RawPrediction, RawResponse};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AckDetector {
        name: String,
        status: u16,
        fail: bool,
    }

    #[async_trait]
    impl Detector for AckDetector {
        fn name(&self) -> &str {
            &self.name
        }

        async fn recognize(
            &self,
            _image_path: &Path,
            _regions: Option<&[PixelBox]>,
        ) -> Result<RawResponse> {
            Ok(RawResponse::new(200, serde_json::json!({})))
        }

        async fn train(&self, _subject: &str, _image_path: &Path) -> Result<RawResponse> {
            if self.fail {
                Err(Error::ConnectionAborted {
                    detector: self.name.clone(),
                    message: "refused".to_string(),
                })
            } else {
                Ok(RawResponse::new(self.status, serde_json::json!({})))
            }
        }

        async fn remove(&self, _subject: &str) -> Result<RawResponse> {
            self.train("", Path::new("")).await
        }

        fn normalize(
            &self,
            _camera: &str,
            _event: &DetectionEvent,
            _raw: &RawResponse,
        ) -> Vec<RawPrediction> {
            Vec::new()
        }
    }

    fn registry() -> DetectorRegistry {
        let mut registry = DetectorRegistry::new();
        registry.insert(
            "ok".to_string(),
            Arc::new(AckDetector {
                name: "ok".to_string(),
                status: 200,
                fail: false,
            }),
        );
        registry.insert(
            "rejects".to_string(),
            Arc::new(AckDetector {
                name: "rejects".to_string(),
                status: 409,
                fail: false,
            }),
        );
        registry.insert(
            "down".to_string(),
            Arc::new(AckDetector {
                name: "down".to_string(),
                status: 0,
                fail: true,
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_train_isolates_backend_failures() {
        let service = TrainingService::new(registry());
        let outcomes = service.train("alice", Path::new("/tmp/alice.jpg")).await;

        assert_eq!(outcomes.len(), 3);
        let by_name = |n: &str| outcomes.iter().find(|o| o.detector == n).unwrap();
        assert!(by_name("ok").success);
        assert!(!by_name("rejects").success);
        assert_eq!(by_name("rejects").status, Some(409));
        assert!(!by_name("down").success);
        assert_eq!(by_name("down").status, None);
    }

    #[tokio::test]
    async fn test_remove_reports_every_backend() {
        let service = TrainingService::new(registry());
        let outcomes = service.remove("alice").await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 1);
    }
}
