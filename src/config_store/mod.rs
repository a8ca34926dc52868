//! ConfigStore - Single Source of Truth (SSoT)
//!
//! ## Responsibilities
//!
//! - Backend (detector) inventory
//! - Camera inventory and per-camera polling settings
//! - Classification threshold resolution (global + per-camera overrides)
//!
//! ## Design Principles
//!
//! - SSoT: all configuration reads go through here
//! - No other module stores camera or detector config locally
//! - The config document is a snapshot loaded once at startup; the file
//!   format itself is owned by the operator, not by this crate

mod types;

pub use types::*;

use crate::error::{Error, Result};
use std::path::Path;
use tokio::fs;

/// ConfigStore instance
pub struct ConfigStore {
    config: Config,
}

impl ConfigStore {
    /// Create from an already-built config document
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Load from a JSON config document
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))?;

        tracing::info!(
            detectors = config.detectors.len(),
            cameras = config.cameras.len(),
            path = %path.display(),
            "Configuration loaded"
        );

        Ok(Self::new(config))
    }

    /// All configured backends
    pub fn detectors(&self) -> &[DetectorEntry] {
        &self.config.detectors
    }

    /// All configured cameras
    pub fn cameras(&self) -> &[CameraEntry] {
        &self.config.cameras
    }

    /// Enabled cameras only
    pub fn enabled_cameras(&self) -> Vec<&CameraEntry> {
        self.config.cameras.iter().filter(|c| c.enabled).collect()
    }

    /// Look up one camera
    pub fn camera(&self, name: &str) -> Option<&CameraEntry> {
        self.config.cameras.iter().find(|c| c.name == name)
    }

    /// Resolve classification thresholds for a camera: global defaults with
    /// per-camera overrides applied
    pub fn detect_for(&self, camera: &str) -> DetectConfig {
        let mut detect = self.config.detect.clone();

        let overrides = self
            .camera(camera)
            .and_then(|c| c.detect.as_ref());

        if let Some(o) = overrides {
            if let Some(m) = &o.match_ {
                if let Some(confidence) = m.confidence {
                    detect.match_.confidence = confidence;
                }
                if let Some(min_area) = m.min_area {
                    detect.match_.min_area = min_area;
                }
            }
            if let Some(u) = &o.unknown {
                if let Some(confidence) = u.confidence {
                    detect.unknown.confidence = confidence;
                }
                if let Some(save) = u.save {
                    detect.unknown.save = save;
                }
            }
        }

        detect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ConfigStore {
        let config: Config = serde_json::from_value(serde_json::json!({
            "detectors": [
                { "kind": "deepstack", "url": "http://127.0.0.1:5000" },
                {
                    "kind": "compreface",
                    "url": "http://127.0.0.1:8000",
                    "key": "secret",
                    "cameras": ["garage"],
                    "face_count_required": true
                }
            ],
            "cameras": [
                {
                    "name": "garage",
                    "snapshot_url": "http://cam.local/snapshot.jpg",
                    "detect": {
                        "match": { "confidence": 80.0, "min_area": 500 },
                        "unknown": { "confidence": 50.0 }
                    }
                },
                { "name": "porch", "snapshot_url": "http://porch.local/img.jpg" }
            ],
            "detect": {
                "match": { "confidence": 95.0, "min_area": 10000 },
                "unknown": { "confidence": 40.0, "save": true }
            }
        }))
        .unwrap();
        ConfigStore::new(config)
    }

    #[test]
    fn test_detect_for_applies_overrides() {
        let store = store();
        let garage = store.detect_for("garage");
        assert_eq!(garage.match_.confidence, 80.0);
        assert_eq!(garage.match_.min_area, 500);
        assert_eq!(garage.unknown.confidence, 50.0);
        // save not overridden, falls back to global
        assert!(garage.unknown.save);
    }

    #[test]
    fn test_detect_for_falls_back_to_global() {
        let store = store();
        let porch = store.detect_for("porch");
        assert_eq!(porch.match_.confidence, 95.0);
        assert_eq!(porch.match_.min_area, 10000);
        assert_eq!(porch.unknown.confidence, 40.0);
    }

    #[test]
    fn test_camera_allow_list() {
        let store = store();
        let deepstack = &store.detectors()[0];
        let compreface = &store.detectors()[1];
        assert!(deepstack.allows_camera("porch"));
        assert!(compreface.allows_camera("garage"));
        assert!(!compreface.allows_camera("porch"));
        assert_eq!(compreface.name(), "compreface");
    }

    #[test]
    fn test_detector_defaults() {
        let entry: DetectorEntry = serde_json::from_value(serde_json::json!({
            "kind": "facebox",
            "url": "http://127.0.0.1:8080"
        }))
        .unwrap();
        assert_eq!(entry.timeout_secs, 15);
        assert!(!entry.face_count_required);
        assert!(entry.cameras.is_empty());
    }
}
