//! Identity tracker: associates per-frame face boxes into persistent
//! identities, routes equipment evidence to them, and makes the gate decision.
//!
//! One cycle per video frame:
//! [`update_faces`](IdentityTracker::update_faces) →
//! [`update_equipment`](IdentityTracker::update_equipment) →
//! [`select_main_identity`](IdentityTracker::select_main_identity) →
//! [`should_open`](IdentityTracker::should_open).
//! [`run_cycle`](IdentityTracker::run_cycle) does all four from raw input.

use crate::config::{ConfigError, TrackerConfig};
use crate::evidence;
use crate::geometry::{overlap_fraction, squared_distance};
use crate::identity::{IdentityId, IdentitySnapshot, TrackedIdentity};
use crate::types::{BoundingBox, Detection, DetectionLabel, FrameInput, FrameSize, RuleCategory, RuleSet};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the identity that drives the gate is picked each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Largest face box, i.e. the person nearest the camera.
    #[default]
    LargestArea,
    /// Face box whose center is nearest the center of the frame.
    ClosestToFrameCenter,
}

impl FromStr for SelectionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "largest_area" => Ok(Self::LargestArea),
            "closest_to_frame_center" => Ok(Self::ClosestToFrameCenter),
            other => Err(ConfigError::Invalid(format!(
                "unknown selection strategy {other:?} (expected largest_area or closest_to_frame_center)"
            ))),
        }
    }
}

/// Everything a renderer or actuator needs from one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub active_identities: usize,
    pub identities: Vec<IdentitySnapshot>,
    pub main_id: Option<IdentityId>,
    pub should_open: bool,
    /// Input entries dropped as malformed this cycle.
    pub rejected: usize,
}

/// Owns every live [`TrackedIdentity`].
///
/// Not internally synchronized: a host that shares a tracker across threads
/// must hold its lock for a whole cycle.
pub struct IdentityTracker {
    config: TrackerConfig,
    /// Kept in creation order; selection ties go to the earliest entry.
    identities: Vec<TrackedIdentity>,
    next_id: u64,
}

impl IdentityTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            identities: Vec::with_capacity(8),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn number_of_active_identities(&self) -> usize {
        self.identities.len()
    }

    pub fn identities(&self) -> &[TrackedIdentity] {
        &self.identities
    }

    pub fn get(&self, id: IdentityId) -> Option<&TrackedIdentity> {
        self.identities.iter().find(|i| i.id() == id)
    }

    /// Drop every identity. Ids keep increasing.
    pub fn reset(&mut self) {
        self.identities.clear();
    }

    /// Associate this cycle's face boxes with tracked identities.
    ///
    /// Each box goes to the identity it overlaps most, provided that overlap
    /// exceeds the face match threshold. Matching is not exclusive: a later
    /// box compares against identity boxes already moved by earlier boxes in
    /// the same call, and may land on the same identity. Unmatched boxes
    /// start new identities; unmatched identities age and are evicted once
    /// past the age limit.
    pub fn update_faces(&mut self, face_boxes: &[BoundingBox]) {
        let mut matched = vec![false; self.identities.len()];
        let mut consumed = vec![false; face_boxes.len()];

        for (fi, face_box) in face_boxes.iter().enumerate() {
            let mut best: Option<usize> = None;
            let mut max_overlap = 0.0f64;
            for (ii, identity) in self.identities.iter().enumerate() {
                let overlap = overlap_fraction(identity.bbox(), face_box);
                if overlap > max_overlap {
                    max_overlap = overlap;
                    best = Some(ii);
                }
            }

            if let Some(ii) = best {
                if max_overlap > self.config.face_match_threshold {
                    if matched[ii] {
                        tracing::debug!(
                            id = %self.identities[ii].id(),
                            "identity matched more than one face box this cycle"
                        );
                    }
                    self.identities[ii].update_bbox(*face_box);
                    matched[ii] = true;
                    consumed[fi] = true;
                }
            }
        }

        for (identity, was_matched) in self.identities.iter_mut().zip(&matched) {
            if !was_matched {
                identity.increase_age();
            }
        }

        for (face_box, _) in face_boxes.iter().zip(&consumed).filter(|(_, c)| !**c) {
            let id = IdentityId(self.next_id);
            self.next_id += 1;
            let coords: [i32; 4] = (*face_box).into();
            tracing::debug!(%id, bbox = ?coords, "new identity");
            self.identities
                .push(TrackedIdentity::new(id, *face_box, self.config.sample_size));
        }

        let age_limit = self.config.age_limit;
        self.identities.retain(|identity| {
            let evict = identity.should_be_evicted(age_limit);
            if evict {
                tracing::debug!(id = %identity.id(), age = identity.age(), "identity evicted");
            }
            !evict
        });
    }

    /// Feed this cycle's equipment detections to every identity.
    ///
    /// For each identity, a detection counts when its overlap with the
    /// identity box exceeds the equipment threshold. The strongest confidence
    /// per rule category is sampled; categories with no evidence sample 0.
    /// Rule states are then recomputed.
    pub fn update_equipment(&mut self, detections: &[Detection]) {
        let threshold = self.config.equipment_match_threshold;

        for identity in &mut self.identities {
            let mut best: RuleSet<f32> = RuleSet::default();

            for detection in detections {
                if detection.label == DetectionLabel::Face {
                    continue;
                }
                if overlap_fraction(identity.bbox(), &detection.bbox) <= threshold {
                    continue;
                }
                if let Some(category) = evidence::classify(identity.bbox(), detection) {
                    best[category] = best[category].max(detection.confidence);
                }
            }

            for category in RuleCategory::ALL {
                identity.append_sample(category, best[category]);
            }
            identity.recompute_rule_state(&self.config.thresholds);
        }
    }

    /// Pick the identity whose compliance drives the gate.
    ///
    /// Ties go to the identity created first. `frame` is only consulted by
    /// [`SelectionStrategy::ClosestToFrameCenter`].
    pub fn select_main_identity(
        &self,
        strategy: SelectionStrategy,
        frame: FrameSize,
    ) -> Option<IdentityId> {
        match strategy {
            SelectionStrategy::LargestArea => {
                let mut main = None;
                let mut max_area = i64::MIN;
                for identity in &self.identities {
                    let area = identity.bbox().area();
                    if area > max_area {
                        max_area = area;
                        main = Some(identity.id());
                    }
                }
                main
            }
            SelectionStrategy::ClosestToFrameCenter => {
                let center = frame.center();
                let mut main = None;
                let mut min_dist = f64::INFINITY;
                for identity in &self.identities {
                    let dist = squared_distance(identity.bbox().center_f64(), center);
                    if dist < min_dist {
                        min_dist = dist;
                        main = Some(identity.id());
                    }
                }
                main
            }
        }
    }

    /// Gate decision for the selected identity. Unknown or absent ids deny.
    pub fn should_open(&self, main_id: Option<IdentityId>) -> bool {
        main_id
            .and_then(|id| self.get(id))
            .map(TrackedIdentity::is_allowed_to_pass)
            .unwrap_or(false)
    }

    /// Run a full cycle on raw detector output.
    ///
    /// Malformed boxes, unknown labels and out-of-range confidences are
    /// dropped one entry at a time; the rest of the frame is still processed.
    pub fn run_cycle(&mut self, input: &FrameInput) -> CycleReport {
        let mut rejected = 0usize;

        let mut faces = Vec::with_capacity(input.faces.len());
        for raw in &input.faces {
            match BoundingBox::from_array(*raw) {
                Ok(bbox) => faces.push(bbox),
                Err(err) => {
                    tracing::warn!(error = %err, "rejecting face box");
                    rejected += 1;
                }
            }
        }

        let mut detections = Vec::with_capacity(input.detections.len());
        for raw in &input.detections {
            match Detection::from_raw(raw) {
                Ok(detection) => detections.push(detection),
                Err(err) => {
                    tracing::warn!(error = %err, label = %raw.label, "rejecting detection");
                    rejected += 1;
                }
            }
        }

        self.update_faces(&faces);
        self.update_equipment(&detections);

        let main_id = self.select_main_identity(self.config.selection, input.size());
        let should_open = self.should_open(main_id);

        tracing::trace!(
            faces = faces.len(),
            detections = detections.len(),
            active = self.identities.len(),
            main = ?main_id,
            should_open,
            "cycle complete"
        );

        CycleReport {
            active_identities: self.identities.len(),
            identities: self.identities.iter().map(TrackedIdentity::snapshot).collect(),
            main_id,
            should_open,
            rejected,
        }
    }
}
