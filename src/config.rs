//! Tunables for a tour, and the user settings that travel with progress.

use crate::geo::Meters;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every knob the engine reads. Any field missing from a tour file falls
/// back to its default, so `config: ()` or no `config` at all is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    /// Content triggers inside this radius.
    pub activation_radius_m: Meters,
    /// Haptic warnings only, inside this radius.
    pub proximity_radius_m: Meters,
    pub gps_update_interval_ms: u64,
    /// Minimum spacing between two mission checks.
    pub proximity_check_interval_ms: u64,
    /// Time between activation and completion of a mission.
    pub completion_delay_ms: u64,
    /// A point cannot be activated twice inside this window.
    pub activation_cooldown_ms: u64,
    pub proximity_vibration_cooldown_ms: u64,
    pub haptic_cooldown_ms: u64,
    pub audio_volume: f32,
    /// Fixes reporting a worse accuracy than this are ignored.
    pub max_fix_accuracy_m: Meters,
    /// Moves shorter than this do not count toward travelled distance.
    pub min_travel_m: Meters,
    pub activation_pattern: Vec<u32>,
    /// Proximity vibration just around the activation radius.
    pub proximity_pattern: Vec<u32>,
}

impl Default for TourConfig {
    fn default() -> Self {
        Self {
            activation_radius_m: 30.0,
            proximity_radius_m: 50.0,
            gps_update_interval_ms: 2000,
            proximity_check_interval_ms: 1000,
            completion_delay_ms: 3000,
            activation_cooldown_ms: 2000,
            proximity_vibration_cooldown_ms: 2000,
            haptic_cooldown_ms: 1000,
            audio_volume: 0.8,
            max_fix_accuracy_m: 50.0,
            min_travel_m: 5.0,
            activation_pattern: vec![200, 100, 200, 100, 200],
            proximity_pattern: vec![100, 50, 100],
        }
    }
}

impl TourConfig {
    pub fn gps_update_interval(&self) -> Duration {
        Duration::from_millis(self.gps_update_interval_ms)
    }

    pub fn proximity_check_interval(&self) -> Duration {
        Duration::from_millis(self.proximity_check_interval_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn activation_cooldown(&self) -> Duration {
        Duration::from_millis(self.activation_cooldown_ms)
    }

    pub fn proximity_vibration_cooldown(&self) -> Duration {
        Duration::from_millis(self.proximity_vibration_cooldown_ms)
    }

    pub fn haptic_cooldown(&self) -> Duration {
        Duration::from_millis(self.haptic_cooldown_ms)
    }

    /// Problems that would make the engine misbehave.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !(self.activation_radius_m > 0.0) {
            issues.push("activation radius must be positive".to_owned());
        }
        if self.proximity_radius_m < self.activation_radius_m {
            issues.push("proximity radius is smaller than the activation radius".to_owned());
        }
        if self.gps_update_interval_ms == 0 {
            issues.push("gps update interval must be non-zero".to_owned());
        }
        if !(0.0..=1.0).contains(&self.audio_volume) {
            issues.push("audio volume must be within 0..=1".to_owned());
        }
        issues
    }
}

/// User toggles, persisted next to the progress record.
///
/// Each field defaults on its own, so a saved record holding only some of
/// them merges into the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub ar_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            vibration_enabled: true,
            ar_enabled: true,
        }
    }
}
