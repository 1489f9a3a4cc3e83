//! The thread-safe buffer where we store [`Fix`]es read from the receiver.

use crate::nmea::NmeaFix;
use crate::position_source::{Fix, PositionSource};

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

/// A [`PositionSource`] that simply acts as a thread-safe buffer where
/// the serial reader thread can push decoded sentences.
#[derive(Debug, Default, Clone)]
pub struct FixBuffer {
    fixes: Arc<Mutex<VecDeque<Fix>>>,
}

impl FixBuffer {
    /// Instantiate a new, empty [`FixBuffer`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a decoded NMEA fix, stamped with its arrival time.
    pub fn add_fix(&self, fix: NmeaFix, at: Instant) {
        self.push(Fix {
            position: fix.position,
            accuracy_m: fix.accuracy_m,
            at,
        });
    }

    /// Queue an already built [`Fix`].
    pub fn push(&self, fix: Fix) {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(fix);
    }

    /// Number of fixes waiting to be consumed.
    pub fn len(&self) -> usize {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no fixes are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for FixBuffer {
    type Item = Fix;

    fn next(&mut self) -> Option<Self::Item> {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl PositionSource for FixBuffer {
    fn clear(&mut self) {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
