//! Draws a tour on a flat chart and lets a simulated walker wander it, to
//! eyeball the simulator and the fix smoothing without walking anywhere.

mod gui;

use clap::Parser;
use std::{
    collections::VecDeque,
    path::PathBuf,
    process,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use geotour::fix_accumulator::FixAccumulator;
use geotour::geo::{centroid, local_xy};
use geotour::simulated_source::SimulatedSource;
use geotour::tour_file::TourDefinition;
use gui::engage_gui;
use log::error;

const TRAIL: usize = 40;

#[derive(Debug, Parser)]
#[clap(version, about = "Watch a simulated walker wander a tour")]
struct MonitorArgs {
    /// Tour definition file (RON). The built-in tour is used when omitted
    tour: Option<PathBuf>,

    /// Time between simulated fixes
    #[arg(short = 'i', long = "interval-ms", default_value_t = 250)]
    interval_ms: u64,

    /// Seed for a reproducible walk
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    env_logger::init();
    let args = MonitorArgs::parse();

    let tour = match &args.tour {
        Some(path) => TourDefinition::from_path(path),
        None => TourDefinition::builtin(),
    };
    let tour = match tour {
        Ok(tour) => tour,
        Err(e) => {
            error!("could not load tour: {e}");
            process::exit(1);
        }
    };
    let Some(origin) = centroid(tour.points.iter().map(|p| &p.coordinates)) else {
        error!("tour '{}' has no points", tour.name);
        process::exit(1);
    };

    let points: Vec<_> = tour
        .points
        .iter()
        .map(|p| local_xy(&origin, &p.coordinates))
        .collect();

    let builder = SimulatedSource::builder(tour.points.iter().map(|p| p.coordinates).collect())
        .interval(Duration::from_millis(args.interval_ms));
    let source = match args.seed {
        Some(seed) => builder.seed(seed).spawn(),
        None => builder.spawn(),
    };
    let source_mtx = Arc::new(Mutex::new(source));

    let mut accumulator = FixAccumulator::new(source_mtx.clone(), tour.config.max_fix_accuracy_m);
    let target_source = source_mtx.clone();
    let targets = points.clone();
    let mut trail = VecDeque::with_capacity(TRAIL);

    let res = engage_gui(
        tour.name.clone(),
        points,
        Box::new(move || {
            let i = target_source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .current_target();
            targets.get(i).copied().into_iter().collect()
        }),
        Box::new(move || {
            if let Some(fix) = accumulator.latest() {
                trail.push_back(local_xy(&origin, &fix.position));
                if trail.len() > TRAIL {
                    trail.pop_front();
                }
            }
            trail.iter().copied().collect()
        }),
    );

    source_mtx
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .stop();

    if let Err(e) = res {
        error!("{e}");
        process::exit(1);
    }
}
