//! Bounding-box overlap math.
//!
//! Overlap is directional: it answers "what fraction of `b` lies inside `a`",
//! counting pixels with both edges included.

use crate::types::BoundingBox;

/// Fraction of `b`'s pixels that fall inside `a`, in `[0, 1]`.
///
/// Not symmetric. Returns 0.0 for disjoint boxes.
pub fn overlap_fraction(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let x1 = i64::from(a.x1.max(b.x1));
    let y1 = i64::from(a.y1.max(b.y1));
    let x2 = i64::from(a.x2.min(b.x2));
    let y2 = i64::from(a.y2.min(b.y2));

    let inter_w = (x2 - x1 + 1).max(0);
    let inter_h = (y2 - y1 + 1).max(0);
    let (b_w, b_h) = b.pixel_extent();

    // Products in f64: extents of extreme boxes overflow i64 when multiplied.
    (inter_w as f64 * inter_h as f64) / (b_w as f64 * b_h as f64)
}

/// Squared Euclidean distance between two points.
pub fn squared_distance(p: (f64, f64), q: (f64, f64)) -> f64 {
    (p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)
}
