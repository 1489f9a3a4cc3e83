//! Walks a GeoTour from the terminal, either with a GPS receiver on a serial
//! port or with a simulated one, and manages the progress it leaves behind.

use clap::Parser;
use geotour::{
    args::{CommandTask, ProgressAction, SimulateCommand, TourArgs, WalkCommand},
    component::{run_component, EngineStage, EventJournal, Stimulus},
    engine::{Platform, TourEngine, TourEvent},
    fix_accumulator::FixAccumulator,
    fix_buffer::FixBuffer,
    geo::{distance_m, format_distance, Coordinate},
    gui::{device_selector, fold_until_stop},
    mission::MissionBoard,
    nmea::{FixWatch, LineFramer, Sentence},
    platform_error::LocationError,
    position_source::PositionSource,
    progress::{unix_millis, ProgressRecord, ProgressStore},
    proximity::closest_pending,
    simulated_source::SimulatedSource,
    stats::{self, Statistics},
    tour_file::{Bounds, PointOfInterest, TourDefinition},
};

use env_logger::Env;
use log::{debug, error, info, warn};
use serial2::SerialPort;
use std::{
    collections::{HashSet, VecDeque},
    error::Error,
    fs::{self, File},
    io::{self, BufWriter},
    ops::ControlFlow,
    path::Path,
    process,
    str,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

type BoxResult<T> = Result<T, Box<dyn Error>>;

/// Rough box around Palhoça/SC, where the built-in tour lives.
const PALHOCA: Bounds = Bounds {
    south: -27.75,
    north: -27.55,
    west: -48.80,
    east: -48.55,
};

const RECENT_EVENTS: usize = 8;

// Example:
// cargo run --bin geotour -- simulate --interval-ms 500 --noise 5
// cargo run --bin geotour -- walk --device /dev/ttyUSB0 --baud 9600
// cargo run --bin geotour -- progress show

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = TourArgs::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        process::exit(1);
    }
}

fn run(args: TourArgs) -> BoxResult<()> {
    let tour = match &args.tour {
        Some(path) => TourDefinition::from_path(path)?,
        None => TourDefinition::builtin()?,
    };
    let store = ProgressStore::new(&args.data_dir);

    match &args.command {
        CommandTask::Check => check(&tour),
        CommandTask::Progress(progress) => match &progress.action {
            ProgressAction::Show => show_progress(&tour, &store),
            ProgressAction::Export { outfile } => export_progress(tour, store, outfile.as_deref()),
            ProgressAction::Reset => {
                store.clear()?;
                println!("Progress in {} cleared", store.dir().display());
                Ok(())
            }
        },
        CommandTask::Walk(walk) => {
            let Some((buffer, errors)) = open_receiver(walk)? else {
                return Ok(());
            };
            drive(tour, &args, buffer, errors)?;
            show_progress_after_walk(&args)
        }
        CommandTask::Simulate(sim) => {
            let source = simulator(&tour, sim);
            let (_errors_tx, errors) = mpsc::channel();
            drive(tour, &args, source, errors)?;
            show_progress_after_walk(&args)
        }
    }
}

/// Validates the tour and prints anything suspicious.
fn check(tour: &TourDefinition) -> BoxResult<()> {
    let mut problems = tour.validate();
    problems.extend(tour.config.validate());

    println!("Tour '{}' with {} points", tour.name, tour.points.len());
    for window in tour.points.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        println!(
            "  {} -> {}: {}",
            a.name,
            b.name,
            format_distance(distance_m(&a.coordinates, &b.coordinates))
        );
    }

    // the first two stops of the built-in tour are a known 70-80m apart
    if let (Some(casa), Some(poste)) = (tour.point("casa"), tour.point("poste")) {
        let d = distance_m(&casa.coordinates, &poste.coordinates);
        if !(70.0..=80.0).contains(&d) {
            problems.push(format!("casa to poste is {d:.1}m, expected 70-80m"));
        }
        let outside = tour.outside_region(&PALHOCA);
        if !outside.is_empty() {
            problems.push(format!("outside Palhoça: {}", outside.join(", ")));
        }
    }

    if problems.is_empty() {
        println!("No problems found");
        Ok(())
    } else {
        for problem in &problems {
            println!("  ! {problem}");
        }
        Err(format!("{} problem(s) found", problems.len()).into())
    }
}

/// The saved record merged over defaults, and the board it describes.
fn saved_board(tour: &TourDefinition, store: &ProgressStore) -> BoxResult<(MissionBoard, ProgressRecord)> {
    let mut record = ProgressRecord::default();
    if let Some(saved) = store.load()? {
        record.merge(saved);
    }
    let mut board = MissionBoard::new(tour.points.clone(), &tour.config);
    board.restore(&record.completed_missions);
    Ok((board, record))
}

fn show_progress(tour: &TourDefinition, store: &ProgressStore) -> BoxResult<()> {
    let (board, record) = saved_board(tour, store)?;
    let summary = Statistics::collect(&board, record.total_distance, record.session_time);
    let completions = store.completions()?;

    println!("{}", tour.name);
    println!(
        "  {}/{} missions ({:.1}%)",
        summary.progress.completed, summary.progress.total, summary.completion_rate
    );
    println!("  walked {}", format_distance(summary.total_distance));
    println!("  played {}", stats::format_time(summary.session_time));
    if summary.progress.completed > 0 {
        println!(
            "  {} per mission",
            stats::format_time(summary.average_time_per_mission as u64)
        );
    }

    for entry in stats::history(&board, &completions) {
        println!("  + {}{}", entry.name, if entry.has_model { " [AR]" } else { "" });
    }
    for point in board.available() {
        println!("  - {}", point.name);
    }

    let gaps = stats::time_between(&board, &completions);
    if !gaps.is_empty() {
        let gaps: Vec<String> = gaps.into_iter().map(stats::format_time).collect();
        println!("  between missions: {}", gaps.join(", "));
    }

    let unlocked = stats::achievements(&summary);
    if !unlocked.is_empty() {
        println!("Achievements");
        for achievement in unlocked {
            println!("  * {}: {}", achievement.name(), achievement.description());
        }
    }
    Ok(())
}

fn show_progress_after_walk(args: &TourArgs) -> BoxResult<()> {
    let tour = match &args.tour {
        Some(path) => TourDefinition::from_path(path)?,
        None => TourDefinition::builtin()?,
    };
    show_progress(&tour, &ProgressStore::new(&args.data_dir))
}

fn export_progress(tour: TourDefinition, store: ProgressStore, outfile: Option<&Path>) -> BoxResult<()> {
    let (board, record) = saved_board(&tour, &store)?;
    let document = stats::export(
        &board,
        &store.completions()?,
        record.total_distance,
        record.session_time,
        unix_millis(),
    );
    match outfile {
        Some(path) => {
            serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &document)?;
            info!("exported progress to {}", path.display());
        }
        None => {
            serde_json::to_writer_pretty(io::stdout().lock(), &document)?;
            println!();
        }
    }
    Ok(())
}

fn simulator(tour: &TourDefinition, sim: &SimulateCommand) -> SimulatedSource {
    let interval = sim
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| tour.config.gps_update_interval());
    let targets = tour.points.iter().map(|p| p.coordinates).collect();

    let builder = SimulatedSource::builder(targets)
        .interval(interval)
        .noise(sim.noise);
    match sim.seed {
        Some(seed) => builder.seed(seed).spawn(),
        None => builder.spawn(),
    }
}

/// Opens the receiver and starts a thread decoding its NMEA output into a
/// [`FixBuffer`]. Receiver failures arrive on the returned channel.
fn open_receiver(walk: &WalkCommand) -> BoxResult<Option<(FixBuffer, Receiver<LocationError>)>> {
    let device = match &walk.device {
        Some(device) => device.clone(),
        None => match device_selector(SerialPort::available_ports()?)? {
            Some(path) => path.to_string_lossy().into_owned(),
            None => return Ok(None),
        },
    };

    let mut port = SerialPort::open(&device, walk.baud)?;
    port.set_read_timeout(Duration::from_secs(10))?;
    info!("reading NMEA from {device} at {} baud", walk.baud);

    let buffer = FixBuffer::new();
    let (errors_tx, errors_rx) = mpsc::channel();
    let th_buffer = buffer.clone();
    thread::spawn(move || read_nmea(port, th_buffer, errors_tx));

    Ok(Some((buffer, errors_rx)))
}

fn read_nmea(port: SerialPort, buffer: FixBuffer, errors: Sender<LocationError>) {
    let mut chunk = [0; 256];
    let mut lines = LineFramer::new();
    let mut watch = FixWatch::new();

    loop {
        let read_len = match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                if errors.send(LocationError::Timeout).is_err() {
                    return;
                }
                continue;
            }
            Err(e) => {
                // the receiver is gone, nothing more will come from it
                let _ = errors.send(LocationError::Other(e.to_string()));
                return;
            }
        };

        for line in chunk[..read_len].iter().filter_map(|&c| lines.push(c)) {
            match str::from_utf8(&line) {
                Ok(s) => match s.trim().parse::<Sentence>() {
                    Ok(sentence) => {
                        let lost = watch.observe(&sentence);
                        match sentence {
                            Sentence::Fix(fix) => {
                                debug!("fix at {}", fix.position);
                                buffer.add_fix(fix, Instant::now());
                            }
                            Sentence::NoFix => {
                                if lost && errors.send(LocationError::PositionUnavailable).is_err() {
                                    return;
                                }
                            }
                            Sentence::Unsupported(kind) => debug!("skipping {kind} sentence"),
                        }
                    }
                    Err(e) => warn!("unreadable sentence {s:?}: {e}"),
                },
                // usual right after opening the port, with half a line buffered
                Err(e) => warn!("failed to decode utf-8: {e:?}"),
            }
        }
    }
}

/// What the status screen shows.
struct WalkStatus {
    points: Vec<PointOfInterest>,
    completed: HashSet<String>,
    position: Option<Coordinate>,
    recent: VecDeque<String>,
    finished: bool,
}

impl WalkStatus {
    fn record(&mut self, event: &TourEvent) {
        let line = match event {
            TourEvent::ProximityAlert { id, distance_m } => {
                format!("{} is {} away", self.name(id), format_distance(*distance_m))
            }
            TourEvent::MissionActivated { id } => format!("Arrived at {}", self.name(id)),
            TourEvent::OverlayShown { model, .. } => format!("Showing {model}"),
            TourEvent::MissionCompleted { id } => {
                self.completed.insert(id.clone());
                format!("Completed {}", self.name(id))
            }
            TourEvent::NarrationEnded { id } => format!("Narration for {} ended", self.name(id)),
            TourEvent::TourCompleted => {
                self.finished = true;
                "Tour completed!".to_owned()
            }
            TourEvent::Error { message } => format!("! {message}"),
        };
        info!("{line}");
        self.recent.push_back(line);
        if self.recent.len() > RECENT_EVENTS {
            self.recent.pop_front();
        }
    }

    fn name<'a>(&'a self, id: &'a str) -> &'a str {
        self.points
            .iter()
            .find(|p| p.id == id)
            .map_or(id, |p| p.name.as_str())
    }

    fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Completed {}/{}",
            self.completed.len(),
            self.points.len()
        )];
        match &self.position {
            Some(position) => {
                lines.push(format!("Position {position}"));
                let next = closest_pending(&self.points, position, |p| {
                    !self.completed.contains(&p.id)
                });
                if let Some((point, distance)) = next {
                    lines.push(format!("Next: {} ({})", point.name, format_distance(distance)));
                }
            }
            None => lines.push("Waiting for a fix...".to_owned()),
        }
        lines.push(String::new());
        lines.extend(self.recent.iter().cloned());
        lines
    }
}

/// The state threaded through every step of a walk.
struct Walk<S: PositionSource> {
    accumulator: FixAccumulator<S>,
    location_errors: Receiver<LocationError>,
    stimuli: Sender<Stimulus>,
    events: Receiver<Vec<TourEvent>>,
    interval: Duration,
    last_fix: Option<Instant>,
    status: WalkStatus,
}

fn step<S: PositionSource>(mut walk: Walk<S>) -> ControlFlow<Walk<S>, Walk<S>> {
    spin_sleep::sleep(walk.interval);

    let now = Instant::now();
    let mut stimuli = Vec::new();
    if let Some(fix) = walk.accumulator.latest() {
        if walk.last_fix.map_or(true, |last| fix.at > last) {
            walk.last_fix = Some(fix.at);
            walk.status.position = Some(fix.position);
            stimuli.push(Stimulus::Fix(fix, now));
        }
    }
    stimuli.extend(walk.location_errors.try_iter().map(Stimulus::LocationError));
    stimuli.push(Stimulus::Tick(now));

    for stimulus in stimuli {
        if walk.stimuli.send(stimulus).is_err() {
            warn!("engine stage is gone");
            return ControlFlow::Break(walk);
        }
    }
    for events in walk.events.try_iter() {
        for event in &events {
            walk.status.record(event);
        }
    }

    if walk.status.finished {
        ControlFlow::Break(walk)
    } else {
        ControlFlow::Continue(walk)
    }
}

/// Runs the tour against `source` until the walker stops it or every
/// mission is done.
fn drive<S>(
    tour: TourDefinition,
    args: &TourArgs,
    source: S,
    location_errors: Receiver<LocationError>,
) -> BoxResult<()>
where
    S: PositionSource + Send + 'static,
{
    let config = tour.config.clone();
    let points = tour.points.clone();
    let title = tour.name.clone();

    let mut engine = TourEngine::new(tour, Platform::headless(&args.audio_root))
        .with_store(ProgressStore::new(&args.data_dir));
    // overlays are reported as events, there is no feed to draw them over
    engine.camera_result(Ok(()));

    let (stage, started) = EngineStage::start(engine, Instant::now());
    let completed: HashSet<String> = stage
        .engine()
        .board()
        .completed_ids()
        .iter()
        .cloned()
        .collect();

    let (stimuli_tx, stimuli_rx) = mpsc::channel();
    let (stage_tx, stage_rx) = mpsc::channel();
    let mut handles: Vec<JoinHandle<()>> = vec![run_component(Box::new(stage), stimuli_rx, stage_tx)];

    let events = match &args.journal {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let file = File::options().create(true).append(true).open(path)?;
            let (journal_tx, journal_rx) = mpsc::channel();
            handles.push(run_component(
                Box::new(EventJournal::new(BufWriter::new(file))),
                stage_rx,
                journal_tx,
            ));
            journal_rx
        }
        None => stage_rx,
    };

    let mut status = WalkStatus {
        points,
        completed,
        position: None,
        recent: VecDeque::new(),
        finished: false,
    };
    for event in &started {
        status.record(event);
    }

    let walk = Walk {
        accumulator: FixAccumulator::new(Arc::new(Mutex::new(source)), config.max_fix_accuracy_m),
        location_errors,
        stimuli: stimuli_tx,
        events,
        interval: config.gps_update_interval(),
        last_fix: None,
        status,
    };

    let walk = if args.plain {
        let mut walk = walk;
        loop {
            match step(walk) {
                ControlFlow::Continue(next) => walk = next,
                ControlFlow::Break(last) => break last,
            }
        }
    } else {
        fold_until_stop(&title, walk, step, |walk| walk.status.lines())?
    };

    // closing the stimulus channel winds the pipeline down; the engine
    // stage saves progress as it finalizes
    let Walk {
        stimuli,
        events,
        mut status,
        ..
    } = walk;
    drop(stimuli);
    for events in events.iter() {
        for event in &events {
            status.record(event);
        }
    }
    for handle in handles {
        if handle.join().is_err() {
            warn!("a pipeline stage panicked");
        }
    }
    Ok(())
}
