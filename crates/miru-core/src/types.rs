//! Wire and domain types shared by the tracker and its hosts.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("degenerate bounding box [{x1}, {y1}, {x2}, {y2}]: need x1 < x2 and y1 < y2")]
    DegenerateBox { x1: i32, y1: i32, x2: i32, y2: i32 },
    #[error("unknown detection label: {0}")]
    UnknownLabel(String),
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f32),
}

/// Axis-aligned pixel box in frame coordinates, corners `(x1, y1)` and `(x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box, rejecting degenerate corners.
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Result<Self, InputError> {
        if x1 >= x2 || y1 >= y2 {
            return Err(InputError::DegenerateBox { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn from_array(coords: [i32; 4]) -> Result<Self, InputError> {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    /// Integer center, rounded toward negative infinity on both axes.
    pub fn center(&self) -> (i32, i32) {
        // Midpoint of two i32 always fits in i32; only the sum needs widening.
        (
            (i64::from(self.x1) + i64::from(self.x2)).div_euclid(2) as i32,
            (i64::from(self.y1) + i64::from(self.y2)).div_euclid(2) as i32,
        )
    }

    /// Sub-pixel center, used for distance ranking.
    pub fn center_f64(&self) -> (f64, f64) {
        (
            (f64::from(self.x1) + f64::from(self.x2)) / 2.0,
            (f64::from(self.y1) + f64::from(self.y2)) / 2.0,
        )
    }

    /// Width and height in pixels with both edges included.
    pub fn pixel_extent(&self) -> (i64, i64) {
        (
            i64::from(self.x2) - i64::from(self.x1) + 1,
            i64::from(self.y2) - i64::from(self.y1) + 1,
        )
    }

    /// Geometric area `(x2 - x1) * (y2 - y1)`, saturating at `i64::MAX`.
    pub fn area(&self) -> i64 {
        (i64::from(self.x2) - i64::from(self.x1))
            .saturating_mul(i64::from(self.y2) - i64::from(self.y1))
    }

    /// Pixel count with both edges included, saturating at `i64::MAX`.
    pub fn pixel_area(&self) -> i64 {
        let (w, h) = self.pixel_extent();
        w.saturating_mul(h)
    }
}

impl TryFrom<[i32; 4]> for BoundingBox {
    type Error = InputError;

    fn try_from(coords: [i32; 4]) -> Result<Self, Self::Error> {
        Self::from_array(coords)
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Class labels emitted by the pose and equipment detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLabel {
    Face,
    /// Net of either kind; hairnet vs. beard-net is decided geometrically.
    WhiteNet,
    BlueNet,
    SafetyGoggles,
    BlueSurgicalMask,
    WhiteSurgicalMask,
}

impl DetectionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::WhiteNet => "white_net",
            Self::BlueNet => "blue_net",
            Self::SafetyGoggles => "safety_goggles",
            Self::BlueSurgicalMask => "blue_surgical_mask",
            Self::WhiteSurgicalMask => "white_surgical_mask",
        }
    }
}

impl FromStr for DetectionLabel {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face" => Ok(Self::Face),
            "white_net" => Ok(Self::WhiteNet),
            "blue_net" => Ok(Self::BlueNet),
            "safety_goggles" => Ok(Self::SafetyGoggles),
            "blue_surgical_mask" => Ok(Self::BlueSurgicalMask),
            "white_surgical_mask" => Ok(Self::WhiteSurgicalMask),
            other => Err(InputError::UnknownLabel(other.to_string())),
        }
    }
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated detection for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: DetectionLabel,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: DetectionLabel, confidence: f32, bbox: BoundingBox) -> Result<Self, InputError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InputError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self { label, confidence, bbox })
    }

    /// Validate a detection as it arrives on the wire.
    pub fn from_raw(raw: &RawDetection) -> Result<Self, InputError> {
        let label = raw.label.parse()?;
        let bbox = BoundingBox::from_array(raw.bbox)?;
        Self::new(label, raw.confidence, bbox)
    }
}

/// Detector output before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
}

/// Everything the detectors produced for one video frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub faces: Vec<[i32; 4]>,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

impl FrameInput {
    pub fn size(&self) -> FrameSize {
        FrameSize {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn center(&self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

/// Compliance rules tracked per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    HairNet = 0,
    BeardNet = 1,
    SafetyGoggles = 2,
    BlueSurgicalMask = 3,
    WhiteSurgicalMask = 4,
}

impl RuleCategory {
    pub const COUNT: usize = 5;

    pub const ALL: [RuleCategory; Self::COUNT] = [
        Self::HairNet,
        Self::BeardNet,
        Self::SafetyGoggles,
        Self::BlueSurgicalMask,
        Self::WhiteSurgicalMask,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HairNet => "hair_net",
            Self::BeardNet => "beard_net",
            Self::SafetyGoggles => "safety_goggles",
            Self::BlueSurgicalMask => "blue_surgical_mask",
            Self::WhiteSurgicalMask => "white_surgical_mask",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per [`RuleCategory`], stored inline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RuleSet<T>([T; RuleCategory::COUNT]);

impl<T> RuleSet<T> {
    pub fn from_fn(mut f: impl FnMut(RuleCategory) -> T) -> Self {
        Self(std::array::from_fn(|i| f(RuleCategory::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RuleCategory, &T)> {
        RuleCategory::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> Index<RuleCategory> for RuleSet<T> {
    type Output = T;

    fn index(&self, category: RuleCategory) -> &T {
        &self.0[category.index()]
    }
}

impl<T> IndexMut<RuleCategory> for RuleSet<T> {
    fn index_mut(&mut self, category: RuleCategory) -> &mut T {
        &mut self.0[category.index()]
    }
}

impl<T: Serialize> Serialize for RuleSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(RuleCategory::COUNT))?;
        for (category, value) in self.iter() {
            map.serialize_entry(category.as_str(), value)?;
        }
        map.end()
    }
}
