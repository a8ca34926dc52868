//! Shared data models
//!
//! Canonical shapes every component exchanges: the per-run detection event,
//! backend-neutral predictions, classified results, and run outcomes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bounding box in source-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl PixelBox {
    /// Degenerate zero-sized box, the final fallback when no backend or
    /// event metadata supplies coordinates
    pub const ZERO: PixelBox = PixelBox {
        x_min: 0,
        y_min: 0,
        x_max: 0,
        y_max: 0,
    };

    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> i64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i64 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> i64 {
        self.width() * self.height()
    }
}

/// Bounding box in the output shape persisted with a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBox {
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
}

impl From<PixelBox> for ResultBox {
    fn from(b: PixelBox) -> Self {
        Self {
            top: b.y_min,
            left: b.x_min,
            width: b.width(),
            height: b.height(),
        }
    }
}

/// Backend-neutral prediction after adapter normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Confidence in 0..=1
    pub confidence: f64,
    /// Subject label as the backend reported it, or "unknown"
    pub label: String,
    /// Bounding box in source-image pixel space
    pub bounding_box: PixelBox,
}

/// Raw backend reply: HTTP status plus the body as loose JSON.
///
/// Ordinary HTTP error statuses are carried here instead of raised so the
/// adapter's normalize step can branch on payload shape.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl RawResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

/// One classified prediction. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResult {
    /// Lower-cased subject name, or the literal "unknown"
    pub name: String,
    /// Confidence 0..=100, rounded to two decimals
    pub confidence: f64,
    #[serde(rename = "match")]
    pub is_match: bool,
    #[serde(rename = "box")]
    pub bounding_box: ResultBox,
    /// Triggered action-check names, attached when non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
}

/// Per-backend outcome of one attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub detector: String,
    /// Backend call duration in seconds, two decimals
    pub duration: f64,
    pub attempt: u32,
    pub results: Vec<ClassifiedResult>,
    pub filename: String,
}

impl AttemptOutcome {
    /// True when any result in this outcome is a confirmed match
    pub fn has_match(&self) -> bool {
        self.results.iter().any(|r| r.is_match)
    }
}

/// Terminal output of one polling run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Total elapsed seconds, two decimals
    pub duration: f64,
    pub kind: EventKind,
    /// Attempts actually used
    pub attempts: u32,
    pub results: Vec<AttemptOutcome>,
}

/// How a polling run was initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Kicked off by an upstream motion/person event carrying metadata
    Triggered,
    /// Started by the interval scheduler
    Scheduled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Triggered => "triggered",
            EventKind::Scheduled => "scheduled",
        }
    }
}

/// Bounding-box attributes nested under an event snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotAttributes {
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
}

/// Snapshot metadata attached to a triggered event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(default)]
    pub attributes: Option<SnapshotAttributes>,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
}

/// Optional metadata a triggered event carries from its source.
///
/// Backends that do not return coordinates fall back through these fields
/// in order: snapshot attributes box, snapshot box, event box.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub snapshot: Option<SnapshotMeta>,
    #[serde(default)]
    pub bounding_box: Option<PixelBox>,
}

/// Shared set of event ids already confirmed matched.
///
/// Concurrent runs for the same upstream event (e.g. snapshot and clip
/// polling) share one set so a match found by either short-circuits both.
pub type MatchedIds = Arc<Mutex<HashSet<String>>>;

/// Create an empty matched-id set
pub fn matched_ids() -> MatchedIds {
    Arc::new(Mutex::new(HashSet::new()))
}

/// Identifies one polling run.
///
/// Owned exclusively by the polling controller for the lifetime of the run
/// and discarded at run end. The matched-id set is the only piece shared
/// with sibling runs.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub camera: String,
    pub id: String,
    pub kind: EventKind,
    pub metadata: Option<EventMetadata>,
    /// Ids already confirmed matched, used to short-circuit later runs
    pub matched_ids: MatchedIds,
    /// Backend name -> consecutive connection-failure count
    pub error_counts: HashMap<String, u32>,
}

impl DetectionEvent {
    pub fn new(camera: impl Into<String>, id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            camera: camera.into(),
            id: id.into(),
            kind,
            metadata: None,
            matched_ids: matched_ids(),
            error_counts: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_matched_ids(mut self, ids: MatchedIds) -> Self {
        self.matched_ids = ids;
        self
    }
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
