use miru_core::{ConfigError, SelectionStrategy, TrackerConfig};
use std::path::PathBuf;
use std::str::FromStr;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Tracker tuning: `MIRU_CONFIG` TOML file, then `MIRU_*` overrides.
    pub tracker: TrackerConfig,
    /// Equipment detections below this confidence are dropped before tracking.
    pub min_equipment_confidence: f32,
    /// Serial device of the turnstile controller (unset: decisions are only logged).
    pub turnstile_device: Option<PathBuf>,
    /// Line the controller answers with when identified.
    pub turnstile_reply: String,
    /// Whether to drive the turnstile at all.
    pub turnstile_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            min_equipment_confidence: 0.65,
            turnstile_device: None,
            turnstile_reply: "THIS_IS_ARDUINO".to_string(),
            turnstile_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from `MIRU_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut tracker = match lookup("MIRU_CONFIG") {
            Some(path) => TrackerConfig::load(&path)?,
            None => TrackerConfig::default(),
        };

        tracker.face_match_threshold =
            parse_or(&lookup, "MIRU_FACE_MATCH_THRESHOLD", tracker.face_match_threshold);
        tracker.equipment_match_threshold = parse_or(
            &lookup,
            "MIRU_EQUIPMENT_MATCH_THRESHOLD",
            tracker.equipment_match_threshold,
        );
        tracker.age_limit = parse_or(&lookup, "MIRU_AGE_LIMIT", tracker.age_limit);
        tracker.sample_size = parse_or(&lookup, "MIRU_SAMPLE_SIZE", tracker.sample_size);
        if let Some(raw) = lookup("MIRU_SELECTION") {
            tracker.selection = SelectionStrategy::from_str(raw.trim())?;
        }
        tracker.validate()?;

        let min_equipment_confidence = parse_or(
            &lookup,
            "MIRU_MIN_EQUIPMENT_CONFIDENCE",
            defaults.min_equipment_confidence,
        );
        if !(0.0..=1.0).contains(&min_equipment_confidence) {
            return Err(ConfigError::Invalid(format!(
                "MIRU_MIN_EQUIPMENT_CONFIDENCE = {min_equipment_confidence} is outside [0, 1]"
            )));
        }

        Ok(Self {
            tracker,
            min_equipment_confidence,
            turnstile_device: lookup("MIRU_TURNSTILE_DEVICE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            turnstile_reply: lookup("MIRU_TURNSTILE_REPLY").unwrap_or(defaults.turnstile_reply),
            turnstile_enabled: lookup("MIRU_TURNSTILE_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(defaults.turnstile_enabled),
        })
    }
}

/// Parse `key` if present and well-formed, otherwise keep `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparseable value");
            default
        }),
        None => default,
    }
}
