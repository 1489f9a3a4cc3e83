use crate::geo::{Coordinate, Meters};
use std::time::Instant;

/// One position report from a receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub position: Coordinate,
    /// Estimated horizontal error, if the receiver reports one.
    pub accuracy_m: Option<Meters>,
    pub at: Instant,
}

impl Fix {
    /// A fix taken right now.
    pub fn now(position: Coordinate, accuracy_m: Option<Meters>) -> Self {
        Self {
            position,
            accuracy_m,
            at: Instant::now(),
        }
    }
}

/// `PositionSource`
///
/// A clearable iterator that emits `Fix`es when iterated upon, yielding
/// `None` when nothing new has arrived. Designed to be flexible enough to
/// wrap a serial GPS receiver, a simulator, or a recorded track.
pub trait PositionSource: Iterator<Item = Fix> {
    fn clear(&mut self);
}
