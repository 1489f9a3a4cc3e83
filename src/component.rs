//! Defines the Component trait, to be used by each stage of the tour
//! pipeline. This enforces a common interface between stages, so that each
//! one can consume data from the preceding stage, process it, and pass new
//! data to the subsequent stage.
//!
//! The binaries wire two stages together: the [`EngineStage`], which turns
//! [`Stimulus`]es into [`TourEvent`]s, and the [`EventJournal`], which
//! appends every event to a JSON-lines file on its way through.

use crate::engine::{TourEngine, TourEvent};
use crate::platform_error::LocationError;
use crate::position_source::Fix;
use crate::progress::unix_millis;

use log::{info, warn};
use serde::Serialize;
use std::{
    borrow::Cow,
    fmt, io,
    io::Write,
    sync::mpsc::{Receiver, Sender},
    thread::{self, JoinHandle},
    time::Instant,
};

#[derive(Debug)]
pub enum ComponentError {
    IoError(io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ComponentError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ComponentError::JsonError(error) => Cow::from(format!("json error: {}", error)),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for ComponentError {}

impl From<io::Error> for ComponentError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value)
    }
}

///
/// A stage in the tour pipeline. All structs that perform a processing
/// step must implement Component, so that they can be integrated into the
/// pipeline.
///
pub trait Component: fmt::Display {
    type InData;
    type OutData;

    /// Converts an input of type A into an output of type B
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up at termination of pipeline
    fn finalize(&mut self) -> Result<(), ComponentError>;
}

/// Runs the given Component on its own thread. On receiving data of type
/// InData on the input channel, the Component converts them to data of type
/// OutData and sends it to the output channel.
pub fn run_component<C: Component + Send + 'static>(
    mut component: Box<C>,
    input: Receiver<<C as Component>::InData>,
    output: Sender<<C as Component>::OutData>,
) -> JoinHandle<()>
where
    <C as Component>::InData: Send + 'static,
    <C as Component>::OutData: Send + 'static,
{
    thread::spawn(move || {
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            if let Err(error) = output.send(out_data) {
                warn!("{} : received error {}.", component, error);
            }
        }

        if let Err(component_error) = component.finalize() {
            warn!("{} : error during terminating : {component_error}.", component);
        }
        info!("{} : terminated.", component);
    })
}

/// What drives the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Stimulus {
    /// A fix and the time it was handed to the engine. The fix's own `at`
    /// may be older.
    Fix(Fix, Instant),
    LocationError(LocationError),
    Tick(Instant),
}

/// Feeds [`Stimulus`]es to a [`TourEngine`]. Finalizing stops the tour,
/// which saves progress.
///
/// The engine's clock never runs backwards: a stimulus stamped earlier than
/// one already seen is handled at the later time.
pub struct EngineStage {
    engine: TourEngine,
    clock: Instant,
}

impl EngineStage {
    /// Starts `engine` and wraps it.
    pub fn start(mut engine: TourEngine, now: Instant) -> (Self, Vec<TourEvent>) {
        let events = engine.start(now);
        (Self { engine, clock: now }, events)
    }

    fn advance(&mut self, now: Instant) -> Instant {
        self.clock = self.clock.max(now);
        self.clock
    }

    pub fn engine(&self) -> &TourEngine {
        &self.engine
    }
}

impl Component for EngineStage {
    type InData = Stimulus;
    type OutData = Vec<TourEvent>;

    fn convert(&mut self, input: Stimulus) -> Vec<TourEvent> {
        match input {
            Stimulus::Fix(fix, now) => {
                let now = self.advance(now);
                self.engine.on_fix(fix, now)
            }
            Stimulus::LocationError(error) => self.engine.on_location_error(error),
            Stimulus::Tick(now) => {
                let now = self.advance(now);
                self.engine.tick(now)
            }
        }
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        let now = self.advance(Instant::now());
        for event in self.engine.stop(now) {
            warn!("while stopping: {event:?}");
        }
        Ok(())
    }
}

impl fmt::Display for EngineStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EngineStage({})", self.engine.name())
    }
}

#[derive(Serialize)]
struct JournalLine<'a> {
    at: u64,
    #[serde(flatten)]
    event: &'a TourEvent,
}

/// Appends every event passing through to `W`, one JSON object per line,
/// and hands the events on unchanged.
pub struct EventJournal<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> EventJournal<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    fn append(&mut self, event: &TourEvent) -> Result<(), ComponentError> {
        let line = JournalLine {
            at: unix_millis(),
            event,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Events written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Component for EventJournal<W> {
    type InData = Vec<TourEvent>;
    type OutData = Vec<TourEvent>;

    fn convert(&mut self, input: Vec<TourEvent>) -> Vec<TourEvent> {
        for event in &input {
            if let Err(e) = self.append(event) {
                warn!("{self} : could not journal {event:?}: {e}");
            }
        }
        input
    }

    fn finalize(&mut self) -> Result<(), ComponentError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> fmt::Display for EventJournal<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventJournal({} written)", self.written)
    }
}
