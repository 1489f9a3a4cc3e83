//! Smoothing of raw receiver output before it reaches the engine.

use crate::geo::{Coordinate, Meters};
use crate::position_source::{Fix, PositionSource};

use log::debug;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

const BUFFER_SIZE: usize = 5;

/// The `FixAccumulator` consumes fixes from a shared [`PositionSource`] and
/// keeps the last few it trusts. It can be queried for a smoothed position
/// using `.latest()`.
pub struct FixAccumulator<S>
where
    S: PositionSource,
{
    source: Arc<Mutex<S>>,
    window: VecDeque<Fix>,
    window_size: usize,
    max_accuracy_m: Meters,
    rejected: usize,
}

impl<S> FixAccumulator<S>
where
    S: PositionSource,
{
    /// Instantiates a new `FixAccumulator` attached to `source`. Fixes that
    /// report an accuracy worse than `max_accuracy_m` are dropped.
    pub fn new(source: Arc<Mutex<S>>, max_accuracy_m: Meters) -> Self {
        Self::with_window(source, max_accuracy_m, BUFFER_SIZE)
    }

    pub fn with_window(source: Arc<Mutex<S>>, max_accuracy_m: Meters, window_size: usize) -> Self {
        Self {
            source,
            window: VecDeque::with_capacity(window_size),
            window_size: window_size.max(1),
            max_accuracy_m,
            rejected: 0,
        }
    }

    /// Drains the source, returning how many new fixes were accepted.
    pub fn poll(&mut self) -> usize {
        let mut accepted = 0;
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        for fix in source.by_ref() {
            if fix.accuracy_m.is_some_and(|a| a > self.max_accuracy_m) {
                debug!("dropping fix at {}, accuracy {:?}", fix.position, fix.accuracy_m);
                self.rejected += 1;
                continue;
            }
            self.window.push_back(fix);
            if self.window.len() > self.window_size {
                self.window.pop_front();
            }
            accepted += 1;
        }
        accepted
    }

    /// Polls the source and returns the mean position of the retained fixes,
    /// stamped with the newest of them. `None` until a fix was accepted.
    pub fn latest(&mut self) -> Option<Fix> {
        self.poll();
        let newest = self.window.back()?;

        let n = self.window.len() as f64;
        let (lat, lng) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(lat, lng), f| (lat + f.position.lat, lng + f.position.lng));
        let accuracy = self
            .window
            .iter()
            .filter_map(|f| f.accuracy_m)
            .reduce(f64::max);

        Some(Fix {
            position: Coordinate::new(lat / n, lng / n),
            accuracy_m: accuracy,
            at: newest.at,
        })
    }

    /// Forgets the retained fixes and anything still queued in the source.
    pub fn clear(&mut self) {
        self.window.clear();
        self.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fixes dropped for poor accuracy so far.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix_buffer::FixBuffer;
    use std::time::{Duration, Instant};

    fn fix(lat: f64, accuracy: Option<f64>, at: Instant) -> Fix {
        Fix {
            position: Coordinate::new(lat, -48.0),
            accuracy_m: accuracy,
            at,
        }
    }

    #[test]
    fn nothing_yet() {
        let buffer = FixBuffer::new();
        let mut acc = FixAccumulator::new(Arc::new(Mutex::new(buffer)), 50.0);
        assert!(acc.latest().is_none());
    }

    #[test]
    fn averages_the_last_five() {
        let buffer = FixBuffer::new();
        let mut acc = FixAccumulator::new(Arc::new(Mutex::new(buffer.clone())), 50.0);
        let t0 = Instant::now();

        for i in 0..7 {
            buffer.push(fix(i as f64, Some(5.0), t0 + Duration::from_secs(i)));
        }

        let smoothed = acc.latest().unwrap();
        // mean of 2..=6
        assert!((smoothed.position.lat - 4.0).abs() < 1e-9);
        assert_eq!(smoothed.at, t0 + Duration::from_secs(6));
        assert!(buffer.is_empty());
    }

    #[test]
    fn inaccurate_fixes_are_dropped() {
        let buffer = FixBuffer::new();
        let mut acc = FixAccumulator::new(Arc::new(Mutex::new(buffer.clone())), 50.0);
        let now = Instant::now();

        buffer.push(fix(1.0, Some(10.0), now));
        buffer.push(fix(9.0, Some(80.0), now));
        buffer.push(fix(3.0, None, now));

        assert_eq!(acc.poll(), 2);
        assert_eq!(acc.rejected(), 1);
        let smoothed = acc.latest().unwrap();
        assert!((smoothed.position.lat - 2.0).abs() < 1e-9);
        assert_eq!(smoothed.accuracy_m, Some(10.0));
    }

    #[test]
    fn clear_forgets_history() {
        let buffer = FixBuffer::new();
        let mut acc = FixAccumulator::new(Arc::new(Mutex::new(buffer.clone())), 50.0);
        buffer.push(fix(1.0, None, Instant::now()));
        acc.poll();
        buffer.push(fix(2.0, None, Instant::now()));

        acc.clear();
        assert!(acc.latest().is_none());
    }
}
