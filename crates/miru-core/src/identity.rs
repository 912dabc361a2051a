//! A single tracked face and its per-rule evidence history.
//!
//! Each identity keeps a short window of detector confidences per rule
//! category. Once per cycle the window mean is pushed through a two-threshold
//! state machine so a rule only flips when the evidence clearly moves.

use crate::config::ThresholdTable;
use crate::types::{BoundingBox, RuleCategory, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Opaque identity handle, unique for the lifetime of the tracker that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u64);

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed-length FIFO of confidence samples, zero-filled at creation.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f32>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: std::iter::repeat(0.0).take(capacity).collect(),
        }
    }

    /// Push a sample, dropping the oldest one.
    pub fn push(&mut self, value: f32) {
        if self.samples.is_empty() {
            return;
        }
        self.samples.pop_front();
        self.samples.push_back(value);
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f32>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Low/high switching thresholds for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hysteresis {
    pub low: f32,
    pub high: f32,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self { low: 0.25, high: 0.50 }
    }
}

impl Hysteresis {
    /// Next rule state given the current one and the window mean.
    ///
    /// A satisfied rule drops only below `low`; an unsatisfied rule rises only
    /// above `high`. Between the two, the current state holds.
    pub fn next_state(&self, current: bool, mean: f32) -> bool {
        if current && mean < self.low {
            false
        } else if !current && mean > self.high {
            true
        } else {
            current
        }
    }
}

/// By-value view of an identity for renderers and reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySnapshot {
    pub id: IdentityId,
    pub bbox: BoundingBox,
    pub age: u32,
    pub rules: RuleSet<bool>,
    pub allowed: bool,
}

/// A face followed across frames.
#[derive(Debug, Clone)]
pub struct TrackedIdentity {
    id: IdentityId,
    bbox: BoundingBox,
    /// Cycles since the last face match.
    age: u32,
    samples: RuleSet<SampleWindow>,
    rules: RuleSet<bool>,
}

impl TrackedIdentity {
    pub fn new(id: IdentityId, bbox: BoundingBox, sample_size: usize) -> Self {
        Self {
            id,
            bbox,
            age: 0,
            samples: RuleSet::from_fn(|_| SampleWindow::new(sample_size)),
            rules: RuleSet::default(),
        }
    }

    pub fn id(&self) -> IdentityId {
        self.id
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    /// Move the identity onto a freshly matched face box.
    pub fn update_bbox(&mut self, bbox: BoundingBox) {
        self.age = 0;
        self.bbox = bbox;
    }

    pub fn increase_age(&mut self) {
        self.age = self.age.saturating_add(1);
    }

    pub fn should_be_evicted(&self, age_limit: u32) -> bool {
        self.age > age_limit
    }

    pub fn append_sample(&mut self, category: RuleCategory, confidence: f32) {
        self.samples[category].push(confidence);
    }

    pub fn mean_confidence(&self, category: RuleCategory) -> f32 {
        self.samples[category].mean()
    }

    /// Re-evaluate every rule from its sample window. Call once per cycle.
    pub fn recompute_rule_state(&mut self, thresholds: &ThresholdTable) {
        for category in RuleCategory::ALL {
            let mean = self.samples[category].mean();
            let current = self.rules[category];
            let next = thresholds.get(category).next_state(current, mean);
            if next != current {
                tracing::debug!(
                    id = %self.id,
                    rule = %category,
                    mean,
                    satisfied = next,
                    "rule state changed"
                );
            }
            self.rules[category] = next;
        }
    }

    pub fn rule(&self, category: RuleCategory) -> bool {
        self.rules[category]
    }

    pub fn rules(&self) -> &RuleSet<bool> {
        &self.rules
    }

    /// Whether the person has a beard that needs covering.
    ///
    /// No beard detector exists yet, so this is always false and the
    /// beard-cover branch of [`is_allowed_to_pass`](Self::is_allowed_to_pass)
    /// never fires.
    pub fn is_beard_present(&self) -> bool {
        false
    }

    /// Access policy: hairnet and goggles are mandatory; a beard additionally
    /// needs a beard net or either surgical mask.
    pub fn is_allowed_to_pass(&self) -> bool {
        if !(self.rules[RuleCategory::HairNet] && self.rules[RuleCategory::SafetyGoggles]) {
            return false;
        }
        let beard_covered = self.rules[RuleCategory::BeardNet]
            || self.rules[RuleCategory::BlueSurgicalMask]
            || self.rules[RuleCategory::WhiteSurgicalMask];
        if self.is_beard_present() && !beard_covered {
            return false;
        }
        true
    }

    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            id: self.id,
            bbox: self.bbox,
            age: self.age,
            rules: self.rules,
            allowed: self.is_allowed_to_pass(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(sample_size: usize) -> TrackedIdentity {
        TrackedIdentity::new(IdentityId(1), BoundingBox::new(0, 0, 100, 100).unwrap(), sample_size)
    }

    /// Append one cycle of evidence: `confidence` for `category`, zero elsewhere.
    fn cycle(identity: &mut TrackedIdentity, category: RuleCategory, confidence: f32) {
        for c in RuleCategory::ALL {
            identity.append_sample(c, if c == category { confidence } else { 0.0 });
        }
        identity.recompute_rule_state(&ThresholdTable::default());
    }

    #[test]
    fn test_sample_window_fifo() {
        let mut w = SampleWindow::new(3);
        assert_eq!(w.len(), 3);
        assert_eq!(w.mean(), 0.0);
        w.push(0.9);
        w.push(0.6);
        w.push(0.3);
        assert!((w.mean() - 0.6).abs() < 1e-6);
        w.push(0.0); // evicts 0.9
        assert!((w.mean() - 0.3).abs() < 1e-6);
        assert_eq!(w.len(), 3);
    }

    #[test]
    fn test_sample_window_zero_capacity() {
        let mut w = SampleWindow::new(0);
        w.push(1.0);
        assert!(w.is_empty());
        assert_eq!(w.mean(), 0.0);
    }

    #[test]
    fn test_hysteresis_dead_zone_holds() {
        let h = Hysteresis::default();
        assert!(!h.next_state(false, 0.4));
        assert!(h.next_state(true, 0.4));
        assert!(!h.next_state(false, 0.50)); // must exceed high
        assert!(h.next_state(true, 0.25)); // must fall below low
        assert!(h.next_state(false, 0.51));
        assert!(!h.next_state(true, 0.24));
    }

    #[test]
    fn test_goggles_become_worn_on_third_cycle() {
        let mut id = identity(5);
        cycle(&mut id, RuleCategory::SafetyGoggles, 0.9); // mean 0.18
        assert!(!id.rule(RuleCategory::SafetyGoggles));
        cycle(&mut id, RuleCategory::SafetyGoggles, 0.9); // mean 0.36
        assert!(!id.rule(RuleCategory::SafetyGoggles));
        cycle(&mut id, RuleCategory::SafetyGoggles, 0.9); // mean 0.54
        assert!(id.rule(RuleCategory::SafetyGoggles));
    }

    #[test]
    fn test_single_dropout_does_not_flicker() {
        let mut id = identity(5);
        for _ in 0..5 {
            cycle(&mut id, RuleCategory::HairNet, 0.9);
        }
        assert!(id.rule(RuleCategory::HairNet));

        // One missed frame: mean 0.72, still above low.
        cycle(&mut id, RuleCategory::HairNet, 0.0);
        assert!(id.rule(RuleCategory::HairNet));

        // Evidence returns.
        cycle(&mut id, RuleCategory::HairNet, 0.9);
        assert!(id.rule(RuleCategory::HairNet));
    }

    #[test]
    fn test_rule_decays_after_sustained_absence() {
        let mut id = identity(5);
        for _ in 0..5 {
            cycle(&mut id, RuleCategory::HairNet, 0.9);
        }
        // Means: 0.72, 0.54, 0.36, 0.18
        for expected in [true, true, true, false] {
            cycle(&mut id, RuleCategory::HairNet, 0.0);
            assert_eq!(id.rule(RuleCategory::HairNet), expected);
        }
    }

    #[test]
    fn test_rule_state_is_sticky_not_window_function() {
        // Same window mean (0.36), different states depending on history.
        let mut rising = identity(5);
        for _ in 0..2 {
            cycle(&mut rising, RuleCategory::HairNet, 0.9);
        }
        let mut falling = identity(5);
        for _ in 0..5 {
            cycle(&mut falling, RuleCategory::HairNet, 0.9);
        }
        for _ in 0..3 {
            cycle(&mut falling, RuleCategory::HairNet, 0.0);
        }
        assert!((rising.mean_confidence(RuleCategory::HairNet) - 0.36).abs() < 1e-5);
        assert!((falling.mean_confidence(RuleCategory::HairNet) - 0.36).abs() < 1e-5);
        assert!(!rising.rule(RuleCategory::HairNet));
        assert!(falling.rule(RuleCategory::HairNet));
    }

    #[test]
    fn test_pass_requires_hairnet_and_goggles() {
        let mut id = identity(1);
        let table = ThresholdTable::default();
        assert!(!id.is_allowed_to_pass());

        id.append_sample(RuleCategory::HairNet, 0.9);
        id.recompute_rule_state(&table);
        assert!(!id.is_allowed_to_pass());

        id.append_sample(RuleCategory::HairNet, 0.9);
        id.append_sample(RuleCategory::SafetyGoggles, 0.9);
        id.recompute_rule_state(&table);
        assert!(id.is_allowed_to_pass());
    }

    #[test]
    fn test_beard_cover_not_required_without_beard_detector() {
        let mut id = identity(1);
        id.append_sample(RuleCategory::HairNet, 0.9);
        id.append_sample(RuleCategory::SafetyGoggles, 0.9);
        id.recompute_rule_state(&ThresholdTable::default());

        assert!(!id.is_beard_present());
        assert!(!id.rule(RuleCategory::BeardNet));
        assert!(!id.rule(RuleCategory::BlueSurgicalMask));
        assert!(!id.rule(RuleCategory::WhiteSurgicalMask));
        assert!(id.is_allowed_to_pass());
    }

    #[test]
    fn test_age_and_eviction() {
        let mut id = identity(5);
        for _ in 0..5 {
            id.increase_age();
        }
        assert!(!id.should_be_evicted(5));
        id.increase_age();
        assert!(id.should_be_evicted(5));

        id.update_bbox(BoundingBox::new(5, 5, 50, 50).unwrap());
        assert_eq!(id.age(), 0);
        assert_eq!(id.bbox(), &BoundingBox::new(5, 5, 50, 50).unwrap());
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut id = identity(1);
        id.append_sample(RuleCategory::SafetyGoggles, 0.8);
        id.recompute_rule_state(&ThresholdTable::default());
        let snap = id.snapshot();
        assert_eq!(snap.id, IdentityId(1));
        assert!(snap.rules[RuleCategory::SafetyGoggles]);
        assert!(!snap.allowed);
    }
}
