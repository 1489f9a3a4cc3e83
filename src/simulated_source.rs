//! A fake GPS receiver for walking a tour from a desk.
//!
//! A background thread drifts around each point of the tour in turn, emitting
//! a fix somewhere 10 to 50 metres from the current target at a random
//! bearing. After every emission there is a fixed chance of moving on to the
//! next point, wrapping around at the end of the tour.

use crate::geo::{offset, Coordinate, Meters};
use crate::position_source::{Fix, PositionSource};

use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::VecDeque,
    f64::consts::TAU,
    ops::Range,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_SPREAD: Range<Meters> = 10.0..50.0;
const DEFAULT_ACCURACY: Meters = 10.0;
const ADVANCE_CHANCE: f64 = 0.3;

enum Signal {
    Interval(Duration),
    Noise(Meters),
    Stop,
}

/// Configures a [`SimulatedSource`] before its thread starts.
#[derive(Debug, Clone)]
pub struct SimulatedSourceBuilder {
    targets: Vec<Coordinate>,
    interval: Duration,
    spread: Range<Meters>,
    noise: Meters,
    accuracy: Option<Meters>,
    advance_chance: f64,
    seed: Option<u64>,
}

impl SimulatedSourceBuilder {
    /// Time between two fixes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Range of distances from the target the walker is placed at.
    pub fn spread(mut self, spread: Range<Meters>) -> Self {
        self.spread = spread;
        self
    }

    /// Extra jitter, in metres, added on top of the spread.
    pub fn noise(mut self, noise: Meters) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Accuracy reported with every fix.
    pub fn accuracy(mut self, accuracy: Option<Meters>) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Probability of moving on to the next point after each fix.
    pub fn advance_chance(mut self, chance: f64) -> Self {
        self.advance_chance = chance.clamp(0.0, 1.0);
        self
    }

    /// Makes the walk reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Starts the simulator thread.
    pub fn spawn(self) -> SimulatedSource {
        let (tx, rx) = mpsc::channel::<Signal>();
        let fixes = Arc::new(Mutex::new(VecDeque::new()));
        let target = Arc::new(AtomicUsize::new(0));

        let th_fixes = Arc::clone(&fixes);
        let th_target = Arc::clone(&target);
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "simulating {} points every {:?}",
            self.targets.len(),
            self.interval
        );

        let handle = thread::spawn(move || {
            let mut interval = self.interval;
            let mut noise = self.noise;
            loop {
                match rx.recv_timeout(interval) {
                    Ok(Signal::Interval(new_interval)) => interval = new_interval,
                    Ok(Signal::Noise(new_noise)) => noise = new_noise,
                    Ok(Signal::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if self.targets.is_empty() {
                            continue;
                        }
                        let index = th_target.load(Ordering::Relaxed) % self.targets.len();
                        let position =
                            wander(&mut rng, &self.targets[index], self.spread.clone(), noise);
                        debug!("simulated fix {position} near point {index}");

                        th_fixes
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push_back(Fix {
                                position,
                                accuracy_m: self.accuracy,
                                at: Instant::now(),
                            });

                        if rng.gen_bool(self.advance_chance) {
                            th_target.store((index + 1) % self.targets.len(), Ordering::Relaxed);
                        }
                    }
                }
            }
        });

        SimulatedSource {
            handle: Some(handle),
            tx,
            fixes,
            target,
        }
    }
}

/// A [`PositionSource`] fed by a simulator thread.
pub struct SimulatedSource {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    fixes: Arc<Mutex<VecDeque<Fix>>>,
    target: Arc<AtomicUsize>,
}

impl SimulatedSource {
    pub fn builder(targets: Vec<Coordinate>) -> SimulatedSourceBuilder {
        SimulatedSourceBuilder {
            targets,
            interval: DEFAULT_INTERVAL,
            spread: DEFAULT_SPREAD,
            noise: 0.0,
            accuracy: Some(DEFAULT_ACCURACY),
            advance_chance: ADVANCE_CHANCE,
            seed: None,
        }
    }

    /// Index of the point the walker is currently drifting around.
    pub fn current_target(&self) -> usize {
        self.target.load(Ordering::Relaxed)
    }

    pub fn set_interval(&self, interval: Duration) {
        self.send(Signal::Interval(interval));
    }

    pub fn set_noise(&self, noise: Meters) {
        self.send(Signal::Noise(noise.max(0.0)));
    }

    fn send(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            warn!("simulator thread is gone");
        }
    }

    /// Stops the simulator thread and waits for it to exit.
    pub fn stop(&mut self) {
        // the thread may already have exited, in which case there is no one to tell
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            if thread.join().is_err() {
                warn!("simulator thread panicked");
            }
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Iterator for SimulatedSource {
    type Item = Fix;
    fn next(&mut self) -> Option<Self::Item> {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl PositionSource for SimulatedSource {
    fn clear(&mut self) {
        self.fixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A position somewhere in `spread` metres of `target`, plus up to `noise`
/// metres of jitter, at a random bearing.
fn wander(rng: &mut impl Rng, target: &Coordinate, spread: Range<Meters>, noise: Meters) -> Coordinate {
    let distance = if spread.is_empty() {
        spread.start
    } else {
        rng.gen_range(spread)
    };
    let jitter = if noise > 0.0 {
        rng.gen_range(0.0..noise)
    } else {
        0.0
    };
    offset(target, distance + jitter, rng.gen_range(0.0..TAU))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_m;

    const CASA: Coordinate = Coordinate {
        lat: -27.630876175110835,
        lng: -48.67969706159946,
    };
    const PRACA: Coordinate = Coordinate {
        lat: -27.62225085741092,
        lng: -48.67485386446606,
    };

    #[test]
    fn wandering_stays_in_the_ring() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let p = wander(&mut rng, &CASA, 10.0..50.0, 0.0);
            let d = distance_m(&CASA, &p);
            // flat-earth offset vs haversine disagree by well under a metre here
            assert!((9.0..=51.0).contains(&d), "{d}");
        }
    }

    #[test]
    fn noise_only_pushes_further_out() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let d = distance_m(&CASA, &wander(&mut rng, &CASA, 20.0..20.0, 5.0));
            assert!((19.0..=26.0).contains(&d), "{d}");
        }
    }

    #[test]
    fn emits_fixes_and_stops() {
        let mut source = SimulatedSource::builder(vec![CASA, PRACA])
            .interval(Duration::from_millis(2))
            .seed(42)
            .spawn();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut fixes = Vec::new();
        while fixes.len() < 20 && Instant::now() < deadline {
            fixes.extend(source.by_ref());
            thread::sleep(Duration::from_millis(2));
        }
        source.stop();

        assert!(fixes.len() >= 20);
        for fix in &fixes {
            let near = distance_m(&CASA, &fix.position).min(distance_m(&PRACA, &fix.position));
            assert!(near <= 51.0);
            assert_eq!(fix.accuracy_m, Some(DEFAULT_ACCURACY));
        }
        assert!(source.current_target() < 2);
    }

    #[test]
    fn no_targets_means_no_fixes() {
        let mut source = SimulatedSource::builder(Vec::new())
            .interval(Duration::from_millis(1))
            .spawn();
        thread::sleep(Duration::from_millis(20));
        source.clear();
        source.stop();
        assert!(source.next().is_none());
    }
}
