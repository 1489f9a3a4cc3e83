//! Haptic feedback: vibration patterns scaled by distance, with a global
//! cooldown so a noisy GPS cannot buzz the walker continuously.
//!
//! A pattern is a list of millisecond durations alternating vibration and
//! pause, starting with a vibration.

use crate::geo::Meters;

use log::{debug, info, warn};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// The device motor.
pub trait Vibrator {
    /// Whether this device can vibrate at all.
    fn is_supported(&self) -> bool;

    /// Plays `pattern`. Returns false if the device refused it. An empty
    /// pattern cancels any ongoing vibration.
    fn vibrate(&mut self, pattern: &[u32]) -> bool;
}

/// A [`Vibrator`] for hosts without a motor, which writes patterns to the
/// log instead.
#[derive(Debug, Default)]
pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn is_supported(&self) -> bool {
        true
    }

    fn vibrate(&mut self, pattern: &[u32]) -> bool {
        info!("bzz {pattern:?}");
        true
    }
}

/// Named vibration strengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intensity {
    Subtle,
    Light,
    Medium,
    Strong,
    Pulse,
    DoublePulse,
    Heartbeat,
}

impl Intensity {
    pub const ALL: [Intensity; 7] = [
        Intensity::Subtle,
        Intensity::Light,
        Intensity::Medium,
        Intensity::Strong,
        Intensity::Pulse,
        Intensity::DoublePulse,
        Intensity::Heartbeat,
    ];

    pub fn pattern(self) -> &'static [u32] {
        match self {
            Intensity::Subtle => &[50],
            Intensity::Light => &[100],
            Intensity::Medium => &[200],
            Intensity::Strong => &[300],
            Intensity::Pulse => &[100, 50, 100],
            Intensity::DoublePulse => &[100, 50, 100, 50, 100],
            Intensity::Heartbeat => &[100, 30, 100, 30, 200],
        }
    }

    /// The stronger, the closer.
    pub fn for_distance(distance: Meters) -> Self {
        if distance <= 10.0 {
            Intensity::Heartbeat
        } else if distance <= 20.0 {
            Intensity::DoublePulse
        } else if distance <= 30.0 {
            Intensity::Pulse
        } else if distance <= 40.0 {
            Intensity::Light
        } else {
            Intensity::Subtle
        }
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intensity::Subtle => "subtle",
            Intensity::Light => "light",
            Intensity::Medium => "medium",
            Intensity::Strong => "strong",
            Intensity::Pulse => "pulse",
            Intensity::DoublePulse => "double-pulse",
            Intensity::Heartbeat => "heartbeat",
        };
        write!(f, "{name}")
    }
}

/// 0 at `max_distance` or beyond, 1 when standing on the point.
pub fn intensity(distance: Meters, max_distance: Meters) -> f64 {
    let normalized = distance.max(0.0).min(max_distance) / max_distance;
    1.0 - normalized
}

/// Interleaves `pulses` and `pauses` into one pattern; the longer list's
/// tail is appended as is.
pub fn custom_pattern(pulses: &[u32], pauses: &[u32]) -> Vec<u32> {
    let len = pulses.len().max(pauses.len());
    (0..len)
        .flat_map(|i| [pulses.get(i), pauses.get(i)])
        .flatten()
        .copied()
        .collect()
}

/// 100 ms pulses separated by 50 ms pauses, filling `duration`.
pub fn continuous_pattern(duration: Duration) -> Vec<u32> {
    const PULSE: u32 = 100;
    const PAUSE: u32 = 50;
    let cycles = duration.as_millis() as u32 / (PULSE + PAUSE);
    let mut pattern = Vec::with_capacity(cycles as usize * 2);
    for i in 0..cycles {
        pattern.push(PULSE);
        if i + 1 < cycles {
            pattern.push(PAUSE);
        }
    }
    pattern
}

/// Snapshot of the haptic system for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct HapticStats {
    pub supported: bool,
    pub enabled: bool,
    pub last_vibration: Option<Instant>,
    pub cooldown: Duration,
    pub can_vibrate: bool,
}

pub struct Haptics {
    vibrator: Box<dyn Vibrator + Send>,
    enabled: bool,
    cooldown: Duration,
    last_vibration: Option<Instant>,
    activation_pattern: Vec<u32>,
    /// Played in the [`Intensity::Pulse`] band, just around the activation
    /// radius.
    proximity_pattern: Vec<u32>,
}

impl Haptics {
    pub fn new(vibrator: Box<dyn Vibrator + Send>, cooldown: Duration, activation: Vec<u32>) -> Self {
        if !vibrator.is_supported() {
            warn!("vibration is not supported on this device");
        }
        Self {
            vibrator,
            enabled: true,
            cooldown,
            last_vibration: None,
            activation_pattern: activation,
            proximity_pattern: Intensity::Pulse.pattern().to_vec(),
        }
    }

    pub fn with_proximity_pattern(mut self, pattern: Vec<u32>) -> Self {
        self.proximity_pattern = pattern;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!("vibration {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn toggle(&mut self) -> bool {
        self.set_enabled(!self.enabled);
        self.enabled
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    pub fn can_vibrate(&self) -> bool {
        self.vibrator.is_supported() && self.enabled
    }

    /// Plays `pattern` unless vibration is off or the previous vibration
    /// was less than a cooldown ago.
    pub fn vibrate(&mut self, pattern: &[u32], kind: &str, now: Instant) -> bool {
        if !self.can_vibrate() {
            return false;
        }
        if let Some(last) = self.last_vibration {
            if now.saturating_duration_since(last) < self.cooldown {
                debug!("{kind} vibration skipped, cooling down");
                return false;
            }
        }
        if self.vibrator.vibrate(pattern) {
            self.last_vibration = Some(now);
            debug!("{kind} vibration {pattern:?}");
            true
        } else {
            warn!("device refused {kind} vibration");
            false
        }
    }

    pub fn vibrate_activation(&mut self, now: Instant) -> bool {
        let pattern = self.activation_pattern.clone();
        self.vibrate(&pattern, "activation", now)
    }

    pub fn vibrate_proximity(&mut self, distance: Meters, now: Instant) -> bool {
        let pattern = match Intensity::for_distance(distance) {
            Intensity::Pulse => self.proximity_pattern.clone(),
            other => other.pattern().to_vec(),
        };
        self.vibrate(&pattern, "proximity", now)
    }

    /// Picks a pattern from how fast the walker is closing in on a point.
    /// Without a previous distance this is plain proximity vibration.
    pub fn vibrate_adaptive(
        &mut self,
        distance: Meters,
        previous: Option<Meters>,
        elapsed: Duration,
        now: Instant,
    ) -> bool {
        let Some(previous) = previous else {
            return self.vibrate_proximity(distance, now);
        };
        let secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let speed = (previous - distance) / secs;

        let intensity = if speed > 2.0 {
            Intensity::Heartbeat
        } else if speed > 1.0 {
            Intensity::DoublePulse
        } else if speed > 0.0 {
            Intensity::for_distance(distance)
        } else {
            Intensity::Subtle
        };
        self.vibrate(intensity.pattern(), "adaptive", now)
    }

    pub fn vibrate_success(&mut self, now: Instant) -> bool {
        self.vibrate(&[200, 100, 200], "success", now)
    }

    pub fn vibrate_error(&mut self, now: Instant) -> bool {
        self.vibrate(&[100, 50, 100, 50, 100], "error", now)
    }

    pub fn vibrate_notification(&mut self, now: Instant) -> bool {
        self.vibrate(&[150], "notification", now)
    }

    pub fn vibrate_alert(&mut self, now: Instant) -> bool {
        self.vibrate(&[300, 100, 300], "alert", now)
    }

    pub fn vibrate_continuous(&mut self, duration: Duration, now: Instant) -> bool {
        let pattern = continuous_pattern(duration);
        self.vibrate(&pattern, "continuous", now)
    }

    /// Plays a named intensity, ignoring the `enabled` toggle but not the
    /// cooldown.
    pub fn test(&mut self, intensity: Intensity, now: Instant) -> bool {
        if !self.vibrator.is_supported() {
            return false;
        }
        let enabled = std::mem::replace(&mut self.enabled, true);
        let played = self.vibrate(intensity.pattern(), "test", now);
        self.enabled = enabled;
        played
    }

    pub fn stop(&mut self) -> bool {
        self.vibrator.is_supported() && self.vibrator.vibrate(&[])
    }

    pub fn last_vibration(&self) -> Option<Instant> {
        self.last_vibration
    }

    pub fn stats(&self) -> HapticStats {
        HapticStats {
            supported: self.vibrator.is_supported(),
            enabled: self.enabled,
            last_vibration: self.last_vibration,
            cooldown: self.cooldown,
            can_vibrate: self.can_vibrate(),
        }
    }

    /// Stops the motor and forgets the cooldown.
    pub fn cleanup(&mut self) {
        self.stop();
        self.last_vibration = None;
    }
}
