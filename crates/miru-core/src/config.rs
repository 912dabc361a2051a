//! Tracker configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or no file)
//! is valid. Example:
//!
//! ```toml
//! age_limit = 5
//! sample_size = 5
//! selection = "closest_to_frame_center"
//!
//! [thresholds.safety_goggles]
//! low = 0.3
//! high = 0.6
//! ```

use crate::identity::Hysteresis;
use crate::tracker::SelectionStrategy;
use crate::types::RuleCategory;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const DEFAULT_FACE_MATCH_THRESHOLD: f64 = 0.5;
const DEFAULT_EQUIPMENT_MATCH_THRESHOLD: f64 = 0.5;
const DEFAULT_AGE_LIMIT: u32 = 5;
const DEFAULT_SAMPLE_SIZE: usize = 5;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Hysteresis thresholds, one entry per rule category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdTable {
    pub hair_net: Hysteresis,
    pub beard_net: Hysteresis,
    pub safety_goggles: Hysteresis,
    pub blue_surgical_mask: Hysteresis,
    pub white_surgical_mask: Hysteresis,
}

impl ThresholdTable {
    pub fn get(&self, category: RuleCategory) -> &Hysteresis {
        match category {
            RuleCategory::HairNet => &self.hair_net,
            RuleCategory::BeardNet => &self.beard_net,
            RuleCategory::SafetyGoggles => &self.safety_goggles,
            RuleCategory::BlueSurgicalMask => &self.blue_surgical_mask,
            RuleCategory::WhiteSurgicalMask => &self.white_surgical_mask,
        }
    }
}

/// Identity tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Minimum overlap (strictly exceeded) for a face box to continue an identity.
    pub face_match_threshold: f64,
    /// Minimum overlap (strictly exceeded) for equipment to count toward an identity.
    pub equipment_match_threshold: f64,
    /// Unmatched cycles an identity survives; one more evicts it.
    pub age_limit: u32,
    /// Confidence samples kept per rule category.
    pub sample_size: usize,
    pub selection: SelectionStrategy,
    pub thresholds: ThresholdTable,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            face_match_threshold: DEFAULT_FACE_MATCH_THRESHOLD,
            equipment_match_threshold: DEFAULT_EQUIPMENT_MATCH_THRESHOLD,
            age_limit: DEFAULT_AGE_LIMIT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            selection: SelectionStrategy::default(),
            thresholds: ThresholdTable::default(),
        }
    }
}

impl TrackerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&src)?;
        tracing::debug!(path = %path.display(), "loaded tracker config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("face_match_threshold", self.face_match_threshold),
            ("equipment_match_threshold", self.equipment_match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} = {value} is outside [0, 1]")));
            }
        }

        if self.sample_size == 0 {
            return Err(ConfigError::Invalid("sample_size must be at least 1".into()));
        }

        for category in RuleCategory::ALL {
            let h = self.thresholds.get(category);
            if !(0.0..=1.0).contains(&h.low) || !(0.0..=1.0).contains(&h.high) {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{category} = [{}, {}] is outside [0, 1]",
                    h.low, h.high
                )));
            }
            if h.low > h.high {
                return Err(ConfigError::Invalid(format!(
                    "thresholds.{category}: low {} exceeds high {}",
                    h.low, h.high
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.age_limit, 5);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.selection, SelectionStrategy::LargestArea);
        for category in RuleCategory::ALL {
            assert_eq!(*config.thresholds.get(category), Hysteresis { low: 0.25, high: 0.50 });
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(TrackerConfig::from_toml_str("").unwrap(), TrackerConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config = TrackerConfig::from_toml_str(
            r#"
            age_limit = 3
            selection = "closest_to_frame_center"

            [thresholds.safety_goggles]
            low = 0.3
            high = 0.6
            "#,
        )
        .unwrap();

        assert_eq!(config.age_limit, 3);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.selection, SelectionStrategy::ClosestToFrameCenter);
        assert_eq!(config.thresholds.safety_goggles, Hysteresis { low: 0.3, high: 0.6 });
        assert_eq!(config.thresholds.hair_net, Hysteresis::default());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = TrackerConfig::from_toml_str(
            r#"
            [thresholds.hair_net]
            low = 0.7
            high = 0.2
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn test_rejects_zero_sample_size() {
        let err = TrackerConfig::from_toml_str("sample_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_out_of_range_match_threshold() {
        let err = TrackerConfig::from_toml_str("face_match_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = TrackerConfig::from_toml_str("agelimit = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "sample_size = 8").unwrap();
        writeln!(file, "equipment_match_threshold = 0.4").unwrap();

        let config = TrackerConfig::load(&path).unwrap();
        assert_eq!(config.sample_size, 8);
        assert!((config.equipment_match_threshold - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrackerConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
