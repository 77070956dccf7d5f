//! Stage settings

use serde::{Deserialize, Serialize};

use crate::key::DEFAULT_MAX_REFERENCE_DEPTH;
use crate::tuning::ScaleMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Starting tempo in BPM
    pub bpm: f64,
    pub beats_per_bar: f64,
    /// Seconds added to every block timestamp so messages arrive ahead of time
    pub latency: f64,
    /// Scale given to players that don't choose one
    pub scale: ScaleMode,
    pub root: f64,
    /// Longest chain of cross-player references allowed in one expression
    pub max_reference_depth: usize,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            beats_per_bar: 4.0,
            latency: 0.2,
            scale: ScaleMode::Major,
            root: 0.0,
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StageConfig = serde_json::from_str(r#"{"bpm": 90.0, "scale": "Minor"}"#).unwrap();
        assert_eq!(config.bpm, 90.0);
        assert_eq!(config.scale, ScaleMode::Minor);
        assert_eq!(config.beats_per_bar, 4.0);
        assert_eq!(config.max_reference_depth, DEFAULT_MAX_REFERENCE_DEPTH);
    }
}
