//! Map raw equipment detections onto compliance rule categories.
//!
//! The equipment detector reports nets with one class per colour, whether
//! worn on the head or on the chin. Which rule a net satisfies is decided
//! from where it sits relative to the face it was attached to.

use crate::types::{BoundingBox, Detection, DetectionLabel, RuleCategory};

/// Rule category a detection counts as evidence for, given the face it overlaps.
///
/// Returns `None` for labels that are not equipment.
pub fn classify(identity_bbox: &BoundingBox, detection: &Detection) -> Option<RuleCategory> {
    match detection.label {
        DetectionLabel::Face => None,
        DetectionLabel::SafetyGoggles => Some(RuleCategory::SafetyGoggles),
        DetectionLabel::BlueSurgicalMask => Some(RuleCategory::BlueSurgicalMask),
        DetectionLabel::WhiteSurgicalMask => Some(RuleCategory::WhiteSurgicalMask),
        DetectionLabel::WhiteNet | DetectionLabel::BlueNet => {
            let (_, face_cy) = identity_bbox.center();
            let (_, net_cy) = detection.bbox.center();
            // Image y grows downward: a smaller center y means the net sits higher.
            if face_cy > net_cy {
                Some(RuleCategory::HairNet)
            } else {
                Some(RuleCategory::BeardNet)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: DetectionLabel, x1: i32, y1: i32, x2: i32, y2: i32) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(x1, y1, x2, y2).unwrap()).unwrap()
    }

    fn face() -> BoundingBox {
        BoundingBox::new(0, 0, 100, 100).unwrap()
    }

    #[test]
    fn test_net_above_center_is_hairnet() {
        let net = det(DetectionLabel::WhiteNet, 10, 0, 90, 30);
        assert_eq!(classify(&face(), &net), Some(RuleCategory::HairNet));
    }

    #[test]
    fn test_net_below_center_is_beardnet() {
        let net = det(DetectionLabel::BlueNet, 20, 70, 80, 100);
        assert_eq!(classify(&face(), &net), Some(RuleCategory::BeardNet));
    }

    #[test]
    fn test_net_at_equal_center_is_beardnet() {
        // Face center y = 50, net center y = 50: "not above" → beard net.
        let net = det(DetectionLabel::WhiteNet, 10, 40, 90, 60);
        assert_eq!(classify(&face(), &net), Some(RuleCategory::BeardNet));
    }

    #[test]
    fn test_net_one_pixel_above_is_hairnet() {
        // Net center y = 49.
        let net = det(DetectionLabel::BlueNet, 10, 39, 90, 59);
        assert_eq!(classify(&face(), &net), Some(RuleCategory::HairNet));
    }

    #[test]
    fn test_masks_and_goggles_map_directly() {
        assert_eq!(
            classify(&face(), &det(DetectionLabel::SafetyGoggles, 10, 30, 90, 50)),
            Some(RuleCategory::SafetyGoggles)
        );
        assert_eq!(
            classify(&face(), &det(DetectionLabel::BlueSurgicalMask, 10, 60, 90, 95)),
            Some(RuleCategory::BlueSurgicalMask)
        );
        // Position is irrelevant for masks.
        assert_eq!(
            classify(&face(), &det(DetectionLabel::WhiteSurgicalMask, 10, 0, 90, 10)),
            Some(RuleCategory::WhiteSurgicalMask)
        );
    }

    #[test]
    fn test_face_label_is_not_evidence() {
        assert_eq!(classify(&face(), &det(DetectionLabel::Face, 0, 0, 100, 100)), None);
    }
}
