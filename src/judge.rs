use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// All windows are in milliseconds of player-time error.
pub const TAP_PERFECT_WINDOW_MS: f64 = 20.0;
pub const TAP_MISS_WINDOW_MS: f64 = 150.0;
pub const HOLD_HEAD_PERFECT_WINDOW_MS: f64 = 20.0;
pub const HOLD_HEAD_MISS_WINDOW_MS: f64 = 150.0;
pub const HOLD_RELEASE_PERFECT_WINDOW_MS: f64 = 40.0;
pub const HOLD_RELEASE_MISS_WINDOW_MS: f64 = 250.0;

pub const TAP_NOTE_WEIGHT: f64 = 10.0;
pub const HOLD_RELEASE_WEIGHT: f64 = 5.0;

pub const SCORE_HISTORY_LENGTH: usize = 20;

// Calibration taps are accepted only inside this raw-error range; a press
// outside it is noise, not latency.
pub const CALIBRATION_ACCEPT_MIN_MS: f64 = -20.0;
pub const CALIBRATION_ACCEPT_MAX_MS: f64 = 150.0;

/// Seed for the latency estimator at the start of every attempt.
pub const DEFAULT_INPUT_OFFSET_MS: f64 = 70.0;

/// A perfect/miss window pair for one judged action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeWindow {
    pub perfect_ms: f64,
    pub miss_ms: f64,
}

/// Every option the judge recognizes, with player-facing defaults. Hosts
/// persist this alongside their other settings; unknown or unreadable files
/// fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub tap: JudgeWindow,
    pub hold_head: JudgeWindow,
    pub hold_release: JudgeWindow,
    pub tap_note_weight: f64,
    pub hold_release_weight: f64,
    pub score_history_len: usize,
    /// Penalize wrong-lane presses as misses for other pending notes.
    pub strict: bool,
    pub calibration_accept_min_ms: f64,
    pub calibration_accept_max_ms: f64,
    pub default_input_offset_ms: f64,
    /// Player-locked latency; overrides the running estimate until cleared.
    pub fixed_input_offset_ms: Option<f64>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            tap: JudgeWindow { perfect_ms: TAP_PERFECT_WINDOW_MS, miss_ms: TAP_MISS_WINDOW_MS },
            hold_head: JudgeWindow {
                perfect_ms: HOLD_HEAD_PERFECT_WINDOW_MS,
                miss_ms: HOLD_HEAD_MISS_WINDOW_MS,
            },
            hold_release: JudgeWindow {
                perfect_ms: HOLD_RELEASE_PERFECT_WINDOW_MS,
                miss_ms: HOLD_RELEASE_MISS_WINDOW_MS,
            },
            tap_note_weight: TAP_NOTE_WEIGHT,
            hold_release_weight: HOLD_RELEASE_WEIGHT,
            score_history_len: SCORE_HISTORY_LENGTH,
            strict: false,
            calibration_accept_min_ms: CALIBRATION_ACCEPT_MIN_MS,
            calibration_accept_max_ms: CALIBRATION_ACCEPT_MAX_MS,
            default_input_offset_ms: DEFAULT_INPUT_OFFSET_MS,
            fixed_input_offset_ms: None,
        }
    }
}

impl JudgeConfig {
    /// Reads a config file, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("judge config {} unreadable: {e}", path.as_ref().display());
                Self::default()
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) {
        let content = match serde_json::to_string_pretty(self) {
            Ok(c) => c,
            Err(e) => {
                warn!("judge config not serializable: {e}");
                return;
            }
        };
        if let Err(e) = fs::write(&path, content) {
            warn!("failed to write judge config {}: {e}", path.as_ref().display());
        }
    }
}

/// Maps an absolute calibrated error onto a 0–100 score: 100 at or inside
/// the perfect window, 0 at or beyond the miss window, linear between.
#[inline(always)]
pub fn accuracy(abs_error_ms: f64, perfect_ms: f64, miss_ms: f64) -> f64 {
    if abs_error_ms <= perfect_ms {
        return 100.0;
    }
    if abs_error_ms >= miss_ms {
        return 0.0;
    }
    100.0 * (1.0 - (abs_error_ms - perfect_ms) / (miss_ms - perfect_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_boundaries() {
        assert!((accuracy(TAP_PERFECT_WINDOW_MS, TAP_PERFECT_WINDOW_MS, TAP_MISS_WINDOW_MS) - 100.0).abs() < 1e-9);
        assert!(accuracy(TAP_MISS_WINDOW_MS, TAP_PERFECT_WINDOW_MS, TAP_MISS_WINDOW_MS).abs() < 1e-9);
        assert!(accuracy(999.0, TAP_PERFECT_WINDOW_MS, TAP_MISS_WINDOW_MS).abs() < 1e-9);
    }

    #[test]
    fn accuracy_midpoint_is_half() {
        assert!((accuracy(50.0, 0.0, 100.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn defaults_round_trip_through_json() {
        let config = JudgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: JudgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: JudgeConfig = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert!(config.strict);
        assert!((config.tap.miss_ms - TAP_MISS_WINDOW_MS).abs() < 1e-9);
    }
}
