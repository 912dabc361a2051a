//! miru-core: identity tracking and protective-equipment compliance decisions.
//!
//! Consumes per-frame face boxes and equipment detections, follows faces
//! across frames, smooths equipment evidence per face with hysteresis, and
//! yields a fail-closed open/deny decision for a turnstile.

pub mod config;
pub mod evidence;
pub mod geometry;
pub mod identity;
pub mod tracker;
pub mod types;

pub use config::{ConfigError, ThresholdTable, TrackerConfig};
pub use identity::{Hysteresis, IdentityId, IdentitySnapshot, TrackedIdentity};
pub use tracker::{CycleReport, IdentityTracker, SelectionStrategy};
pub use types::{
    BoundingBox, Detection, DetectionLabel, FrameInput, FrameSize, InputError, RawDetection,
    RuleCategory, RuleSet,
};
