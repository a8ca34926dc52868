//! ConfigStore data types
//!
//! Typed configuration for backends, cameras, and classification thresholds

use serde::{Deserialize, Serialize};

/// Recognition backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Compreface,
    Deepstack,
    Facebox,
    Frigate,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Compreface => "compreface",
            DetectorKind::Deepstack => "deepstack",
            DetectorKind::Facebox => "facebox",
            DetectorKind::Frigate => "frigate",
        }
    }
}

/// One configured recognition backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorEntry {
    /// Registry key; defaults to the kind name
    #[serde(default)]
    pub name: Option<String>,
    pub kind: DetectorKind,
    /// Backend base URL
    pub url: String,
    /// API key, sent the way the backend expects it
    #[serde(default)]
    pub key: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_detector_timeout")]
    pub timeout_secs: u64,
    /// Camera allow-list; empty means all cameras
    #[serde(default)]
    pub cameras: Vec<String>,
    /// Skip this backend when the local face counter finds zero faces
    #[serde(default)]
    pub face_count_required: bool,
}

impl DetectorEntry {
    /// Registry key for this entry
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }

    /// True when this backend accepts images from the given camera
    pub fn allows_camera(&self, camera: &str) -> bool {
        self.cameras.is_empty() || self.cameras.iter().any(|c| c == camera)
    }
}

fn default_detector_timeout() -> u64 {
    15
}

/// Match thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Minimum confidence (0-100) for a match
    #[serde(default = "default_match_confidence")]
    pub confidence: f64,
    /// Minimum bounding-box area in pixels for a match
    #[serde(default = "default_min_area")]
    pub min_area: i64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            confidence: default_match_confidence(),
            min_area: default_min_area(),
        }
    }
}

fn default_match_confidence() -> f64 {
    95.0
}

fn default_min_area() -> i64 {
    10000
}

/// Unknown-detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownConfig {
    /// Below this confidence (0-100) a subject classifies as "unknown"
    #[serde(default = "default_unknown_confidence")]
    pub confidence: f64,
    /// Persist attempts that detected faces but produced no match
    #[serde(default = "default_true")]
    pub save: bool,
}

impl Default for UnknownConfig {
    fn default() -> Self {
        Self {
            confidence: default_unknown_confidence(),
            save: default_true(),
        }
    }
}

fn default_unknown_confidence() -> f64 {
    40.0
}

fn default_true() -> bool {
    true
}

/// Classification thresholds for one camera
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectConfig {
    #[serde(rename = "match", default)]
    pub match_: MatchConfig,
    #[serde(default)]
    pub unknown: UnknownConfig,
}

/// Per-camera detect overrides; unset fields fall back to the global values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectOverrides {
    #[serde(rename = "match", default)]
    pub match_: Option<MatchOverrides>,
    #[serde(default)]
    pub unknown: Option<UnknownOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOverrides {
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub min_area: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnknownOverrides {
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub save: Option<bool>,
}

/// One camera entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    pub name: String,
    /// Snapshot URL; may carry userinfo credentials for digest sources
    pub snapshot_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Polling attempts per run
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Stop the run on the first match
    #[serde(default = "default_true")]
    pub break_match: bool,
    /// Post-event delay in seconds applied to triggered runs
    #[serde(default)]
    pub delay: f64,
    #[serde(default)]
    pub detect: Option<DetectOverrides>,
}

fn default_retries() -> u32 {
    3
}

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detectors: Vec<DetectorEntry>,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
    /// Global classification thresholds
    #[serde(default)]
    pub detect: DetectConfig,
}
