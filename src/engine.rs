//! The tour engine.
//!
//! `TourEngine` owns every piece of tour state and is driven from a single
//! thread by three inputs: position fixes, location errors and the passage
//! of time. Each input returns the [`TourEvent`]s it caused. Time is always
//! passed in, never read, so a whole walk can be replayed deterministically.
//!
//! ```text
//!   fix ──► accuracy gate ──► distance ──► mission check (throttled)
//!                                               │
//!                     ┌─────────────────────────┴──────────┐
//!                inside activation radius         inside proximity radius
//!                     │                                    │
//!           activate: narration, haptics,           proximity alert,
//!           overlay, completion scheduled           proximity haptics
//!
//!   tick ──► due completions ──► progress saved ──► tour completed?
//!        └─► narration finished?
//! ```

use crate::config::{Settings, TourConfig};
use crate::geo::Meters;
use crate::haptics::{Haptics, LogVibrator, Vibrator};
use crate::mission::MissionBoard;
use crate::narration::{AudioSink, LogSink, Narrator};
use crate::overlay::Overlay;
use crate::platform_error::{CameraError, ErrorLog, LocationError, PlatformError};
use crate::position_source::Fix;
use crate::progress::{unix_millis, CompletionRecord, Completions, ProgressRecord, ProgressStore};
use crate::proximity::ProximityEvaluator;
use crate::stats::{self, ExportDocument, Statistics};
use crate::tour_file::TourDefinition;

use log::{debug, info, warn};
use serde::Serialize;
use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

/// Something the walker should hear about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TourEvent {
    ProximityAlert { id: String, distance_m: Meters },
    MissionActivated { id: String },
    OverlayShown { id: String, model: String },
    MissionCompleted { id: String },
    NarrationEnded { id: String },
    TourCompleted,
    Error { message: String },
}

/// The host capabilities the engine drives.
pub struct Platform {
    pub vibrator: Box<dyn Vibrator + Send>,
    pub audio: Box<dyn AudioSink + Send>,
    /// Narration paths in the tour are resolved against this directory.
    pub audio_root: PathBuf,
}

impl Platform {
    /// A platform with neither motor nor speakers, which logs instead.
    pub fn headless(audio_root: impl Into<PathBuf>) -> Self {
        Self {
            vibrator: Box::new(LogVibrator),
            audio: Box::new(LogSink),
            audio_root: audio_root.into(),
        }
    }
}

pub struct TourEngine {
    name: String,
    config: TourConfig,
    board: MissionBoard,
    evaluator: ProximityEvaluator,
    haptics: Haptics,
    narrator: Narrator,
    overlay: Overlay,
    store: Option<ProgressStore>,
    errors: ErrorLog,
    settings: Settings,
    location_permitted: bool,
    running: bool,
    started_at: Option<Instant>,
    /// Session time carried over from earlier runs.
    previous_session: Duration,
    total_distance: Meters,
    position: Option<Fix>,
    last_check: Option<Instant>,
    last_proximity_alert: Option<Instant>,
}

impl TourEngine {
    pub fn new(tour: TourDefinition, platform: Platform) -> Self {
        let TourDefinition {
            name,
            config,
            points,
        } = tour;
        Self {
            board: MissionBoard::new(points, &config),
            evaluator: ProximityEvaluator::from_config(&config),
            haptics: Haptics::new(
                platform.vibrator,
                config.haptic_cooldown(),
                config.activation_pattern.clone(),
            )
            .with_proximity_pattern(config.proximity_pattern.clone()),
            narrator: Narrator::new(platform.audio, platform.audio_root, config.audio_volume),
            overlay: Overlay::new(),
            store: None,
            errors: ErrorLog::new(),
            settings: Settings::default(),
            location_permitted: true,
            running: false,
            started_at: None,
            previous_session: Duration::ZERO,
            total_distance: 0.0,
            position: None,
            last_check: None,
            last_proximity_alert: None,
            name,
            config,
        }
    }

    /// Persists progress through `store`.
    pub fn with_store(mut self, store: ProgressStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads saved progress, preloads narration and starts accepting fixes.
    pub fn start(&mut self, now: Instant) -> Vec<TourEvent> {
        if self.running {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.load_progress(&mut events);

        let failures = self.narrator.preload(
            self.board
                .points()
                .iter()
                .map(|p| (p.id.as_str(), p.audio.as_str())),
        );
        for (id, e) in failures {
            warn!("narration for {id} unavailable: {e:?}");
        }

        self.running = true;
        self.started_at = Some(now);
        let progress = self.board.progress();
        info!(
            "tour '{}' started, {}/{} completed",
            self.name, progress.completed, progress.total
        );
        events
    }

    /// Stops tracking and saves progress.
    pub fn stop(&mut self, now: Instant) -> Vec<TourEvent> {
        if !self.running {
            return Vec::new();
        }
        self.previous_session = self.session_time(now);
        self.started_at = None;
        self.running = false;

        self.narrator.stop_current();
        self.haptics.cleanup();
        self.overlay.hide();

        let mut events = Vec::new();
        self.save_progress(&mut events);
        info!("tour stopped after {}", stats::format_time(self.session_millis(now)));
        events
    }

    /// Forgets the current progress and starts over. The completion history
    /// on disk is kept.
    pub fn restart(&mut self, now: Instant) -> Vec<TourEvent> {
        let mut events = self.stop(now);
        self.board.reset();
        self.total_distance = 0.0;
        self.previous_session = Duration::ZERO;
        self.position = None;
        self.last_check = None;
        self.last_proximity_alert = None;
        if let Some(store) = &self.store {
            if let Err(e) = store.clear_progress() {
                events.push(self.report(PlatformError::Storage(e.to_string())));
            }
        }
        info!("tour progress reset");
        events.extend(self.start(now));
        events
    }

    pub fn on_fix(&mut self, fix: Fix, now: Instant) -> Vec<TourEvent> {
        if !self.running {
            return Vec::new();
        }
        if let Some(accuracy) = fix.accuracy_m {
            if accuracy > self.config.max_fix_accuracy_m {
                debug!("ignoring fix with accuracy {accuracy:.0}m");
                return Vec::new();
            }
        }
        self.location_permitted = true;

        if let Some(previous) = &self.position {
            let moved = previous.position.distance_to(&fix.position);
            if moved > self.config.min_travel_m {
                self.total_distance += moved;
            }
        }
        self.position = Some(fix);

        let mut events = Vec::new();
        self.check_missions(now, &mut events);
        events
    }

    /// Files a receiver failure. Only a permission refusal changes what the
    /// engine does: no fixes are expected until one arrives anyway.
    pub fn on_location_error(&mut self, error: LocationError) -> Vec<TourEvent> {
        if error == LocationError::PermissionDenied {
            self.location_permitted = false;
        }
        let error = PlatformError::from(error);
        if error.is_transient() {
            debug!("location timeout, still tracking");
        }
        vec![self.report(error)]
    }

    /// Records the host's answer to the camera request.
    pub fn camera_result(&mut self, result: Result<(), CameraError>) -> Vec<TourEvent> {
        self.overlay.camera_result(result.clone());
        match result {
            Ok(()) => Vec::new(),
            Err(e) => vec![self.report(e.into())],
        }
    }

    /// Advances timers: pending completions, narration end and the periodic
    /// mission check against the last known position.
    pub fn tick(&mut self, now: Instant) -> Vec<TourEvent> {
        if !self.running {
            return Vec::new();
        }
        let mut events = Vec::new();

        if let Some(id) = self.narrator.tick(now) {
            events.push(TourEvent::NarrationEnded { id });
        }
        for id in self.board.due_completions(now) {
            self.complete_mission(&id, now, &mut events);
            if !self.running {
                return events;
            }
        }
        self.check_missions(now, &mut events);
        events
    }

    fn check_missions(&mut self, now: Instant, events: &mut Vec<TourEvent>) {
        let Some(fix) = self.position else {
            return;
        };
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) < self.config.proximity_check_interval() {
                return;
            }
        }
        self.last_check = Some(now);

        let nearby: Vec<(String, Meters, bool)> = self
            .evaluator
            .nearby(self.board.points(), &fix.position)
            .into_iter()
            .map(|n| (n.point.id.clone(), n.distance_m, n.can_activate))
            .collect();

        for (id, distance, can_activate) in nearby {
            if can_activate && !self.board.is_completed(&id) {
                match self.board.activate(&id, now) {
                    Ok(()) => self.on_activated(&id, now, events),
                    Err(refusal) => debug!("{id} not activated: {refusal:?}"),
                }
            } else {
                self.proximity_alert(&id, distance, now, events);
            }
        }
    }

    fn proximity_alert(
        &mut self,
        id: &str,
        distance: Meters,
        now: Instant,
        events: &mut Vec<TourEvent>,
    ) {
        if let Some(last) = self.last_proximity_alert {
            if now.saturating_duration_since(last) < self.config.proximity_vibration_cooldown() {
                return;
            }
        }
        self.last_proximity_alert = Some(now);
        self.haptics.vibrate_proximity(distance, now);
        events.push(TourEvent::ProximityAlert {
            id: id.to_owned(),
            distance_m: distance,
        });
    }

    fn on_activated(&mut self, id: &str, now: Instant, events: &mut Vec<TourEvent>) {
        let Some(point) = self.board.point(id).cloned() else {
            return;
        };
        info!("mission {} activated", point.name);
        events.push(TourEvent::MissionActivated { id: point.id.clone() });

        if self.settings.sound_enabled {
            if let Err(e) = self.narrator.play(&point.id, &point.audio, now) {
                events.push(self.report(e.into()));
            }
        }
        self.haptics.vibrate_activation(now);

        if let Some(model) = self.overlay.show_for(&point, self.settings.ar_enabled) {
            events.push(TourEvent::OverlayShown {
                id: point.id.clone(),
                model: model.to_owned(),
            });
        }
    }

    fn complete_mission(&mut self, id: &str, now: Instant, events: &mut Vec<TourEvent>) {
        if !self.board.complete(id) {
            return;
        }
        info!("mission {id} completed");
        events.push(TourEvent::MissionCompleted { id: id.to_owned() });

        if let Some(store) = &self.store {
            let record = CompletionRecord {
                completed_at: unix_millis(),
                session_time: self.session_millis(now),
                total_distance: self.total_distance,
            };
            if let Err(e) = store.record_completion(id, record) {
                events.push(self.report(PlatformError::Storage(e.to_string())));
            }
        }
        self.save_progress_at(now, events);

        if self.board.is_all_completed() {
            info!("every mission completed");
            events.push(TourEvent::TourCompleted);
            events.extend(self.stop(now));
        }
    }

    fn load_progress(&mut self, events: &mut Vec<TourEvent>) {
        let Some(store) = &self.store else {
            return;
        };
        let saved = match store.load() {
            Ok(Some(saved)) => saved,
            Ok(None) => return,
            Err(e) => {
                events.push(self.report(PlatformError::Storage(e.to_string())));
                return;
            }
        };

        let mut record = self.record_at(None);
        record.merge(saved);
        self.board.restore(&record.completed_missions);
        self.total_distance = record.total_distance;
        self.previous_session = Duration::from_millis(record.session_time);
        self.apply_settings(record.settings);
        debug!("restored {} completed missions", record.completed_missions.len());
    }

    fn save_progress(&mut self, events: &mut Vec<TourEvent>) {
        let record = self.record_at(None);
        self.write_record(&record, events);
    }

    fn save_progress_at(&mut self, now: Instant, events: &mut Vec<TourEvent>) {
        let record = self.record_at(Some(now));
        self.write_record(&record, events);
    }

    fn write_record(&mut self, record: &ProgressRecord, events: &mut Vec<TourEvent>) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(record) {
            events.push(self.report(PlatformError::Storage(e.to_string())));
        }
    }

    fn record_at(&self, now: Option<Instant>) -> ProgressRecord {
        ProgressRecord {
            completed_missions: self.board.completed_ids().to_vec(),
            total_distance: self.total_distance,
            session_time: match now {
                Some(now) => self.session_millis(now),
                None => self.previous_session.as_millis() as u64,
            },
            settings: self.settings,
            timestamp: 0,
        }
    }

    /// The progress record as it would be saved at `now`.
    pub fn record(&self, now: Instant) -> ProgressRecord {
        self.record_at(Some(now))
    }

    fn report(&mut self, error: PlatformError) -> TourEvent {
        let message = error.user_message().to_owned();
        self.errors.record(error);
        TourEvent::Error { message }
    }

    fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.haptics.set_enabled(settings.vibration_enabled);
        if !settings.sound_enabled {
            self.narrator.stop_current();
        }
        if !settings.ar_enabled {
            self.overlay.hide();
        }
    }

    /// Changes the user toggles and saves them with the progress.
    pub fn set_settings(&mut self, settings: Settings, now: Instant) -> Vec<TourEvent> {
        self.apply_settings(settings);
        let mut events = Vec::new();
        self.save_progress_at(now, &mut events);
        events
    }

    /// Total play time, earlier runs included.
    pub fn session_time(&self, now: Instant) -> Duration {
        let current = self
            .started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        self.previous_session + current
    }

    fn session_millis(&self, now: Instant) -> u64 {
        self.session_time(now).as_millis() as u64
    }

    pub fn statistics(&self, now: Instant) -> Statistics {
        Statistics::collect(&self.board, self.total_distance, self.session_millis(now))
    }

    /// The shareable summary of this walk.
    pub fn export(&self, now: Instant) -> ExportDocument {
        let completions = match &self.store {
            Some(store) => store.completions().unwrap_or_else(|e| {
                warn!("completion history unavailable: {e}");
                Completions::new()
            }),
            None => Completions::new(),
        };
        stats::export(
            &self.board,
            &completions,
            self.total_distance,
            self.session_millis(now),
            unix_millis(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TourConfig {
        &self.config
    }

    pub fn board(&self) -> &MissionBoard {
        &self.board
    }

    pub fn position(&self) -> Option<&Fix> {
        self.position.as_ref()
    }

    /// Metres walked, counting only moves longer than the travel threshold.
    pub fn total_distance(&self) -> Meters {
        self.total_distance
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn haptics(&self) -> &Haptics {
        &self.haptics
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn location_permitted(&self) -> bool {
        self.location_permitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{offset, Coordinate};
    use crate::haptics::tests::RecordingVibrator;
    use crate::narration::tests::{write_wav, RecordingSink};
    use std::sync::{Arc, Mutex};

    type Played = Arc<Mutex<Vec<Vec<u32>>>>;
    type Calls = Arc<Mutex<Vec<String>>>;

    struct Rig {
        engine: TourEngine,
        played: Played,
        calls: Calls,
        dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let vibrator = RecordingVibrator::default();
        let sink = RecordingSink::default();
        let (played, calls) = (vibrator.played.clone(), sink.calls.clone());

        let platform = Platform {
            vibrator: Box::new(vibrator),
            audio: Box::new(sink),
            audio_root: dir.path().to_path_buf(),
        };
        let engine = TourEngine::new(TourDefinition::builtin().unwrap(), platform)
            .with_store(ProgressStore::new(dir.path().join("data")));
        Rig {
            engine,
            played,
            calls,
            dir,
        }
    }

    fn at(engine: &TourEngine, id: &str) -> Coordinate {
        engine.board().point(id).unwrap().coordinates
    }

    fn fix(position: Coordinate, at: Instant) -> Fix {
        Fix {
            position,
            accuracy_m: Some(5.0),
            at,
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn activated(events: &[TourEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                TourEvent::MissionActivated { id } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn arriving_at_a_point_runs_the_mission() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        let casa = at(&rig.engine, "casa");
        let events = rig.engine.on_fix(fix(casa, t0), t0);
        assert_eq!(activated(&events), ["casa"]);
        assert_eq!(
            rig.played.lock().unwrap().last().unwrap(),
            &vec![200, 100, 200, 100, 200]
        );
        assert_eq!(rig.calls.lock().unwrap().last().unwrap(), "play casa 0");

        // still standing there, but the mission is already active
        let events = rig.engine.on_fix(fix(casa, t0 + secs(1.5)), t0 + secs(1.5));
        assert!(activated(&events).is_empty());

        let events = rig.engine.tick(t0 + secs(3.0));
        assert!(events.contains(&TourEvent::MissionCompleted { id: "casa".into() }));
        assert!(rig.engine.board().is_completed("casa"));

        let store = ProgressStore::new(rig.dir.path().join("data"));
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.completed_missions.unwrap(), ["casa"]);
        assert!(store.completions().unwrap().contains_key("casa"));
    }

    #[test]
    fn completion_fires_once() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        let casa = at(&rig.engine, "casa");

        let mut completed = 0;
        for i in 0..20 {
            let now = t0 + secs(i as f64 * 0.5);
            let mut events = rig.engine.on_fix(fix(casa, now), now);
            events.extend(rig.engine.tick(now));
            completed += events
                .iter()
                .filter(|e| matches!(e, TourEvent::MissionCompleted { .. }))
                .count();
        }
        assert_eq!(completed, 1);
    }

    #[test]
    fn approaching_only_alerts() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        // north of casa, away from poste
        let near = offset(&at(&rig.engine, "casa"), 40.0, 0.0);
        let events = rig.engine.on_fix(fix(near, t0), t0);

        assert!(activated(&events).is_empty());
        match &events[..] {
            [TourEvent::ProximityAlert { id, distance_m }] => {
                assert_eq!(id, "casa");
                assert!((35.0..45.0).contains(distance_m));
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(rig.played.lock().unwrap().len(), 1);

        // inside the alert cooldown
        let events = rig.engine.tick(t0 + secs(1.5));
        assert!(events.is_empty());
        // next check is due at 2.5s, past the alert cooldown
        let events = rig.engine.tick(t0 + secs(2.5));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn checks_are_throttled() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        let far = offset(&at(&rig.engine, "casa"), 400.0, 0.0);
        assert!(rig.engine.on_fix(fix(far, t0), t0).is_empty());

        let casa = at(&rig.engine, "casa");
        let half = t0 + secs(0.5);
        assert!(activated(&rig.engine.on_fix(fix(casa, half), half)).is_empty());
        assert_eq!(activated(&rig.engine.tick(t0 + secs(1.0))), ["casa"]);
    }

    #[test]
    fn poor_fixes_are_ignored() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        let casa = at(&rig.engine, "casa");
        let mut bad = fix(casa, t0);
        bad.accuracy_m = Some(80.0);
        assert!(rig.engine.on_fix(bad, t0).is_empty());
        assert!(rig.engine.position().is_none());
    }

    #[test]
    fn only_real_moves_count_as_distance() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        let origin = offset(&at(&rig.engine, "casa"), 500.0, 0.0);
        rig.engine.on_fix(fix(origin, t0), t0);
        rig.engine.on_fix(fix(offset(&origin, 3.0, 0.0), t0), t0);
        assert_eq!(rig.engine.total_distance(), 0.0);

        let far = offset(&origin, 103.0, 0.0);
        rig.engine.on_fix(fix(far, t0), t0);
        let walked = rig.engine.total_distance();
        assert!((95.0..105.0).contains(&walked), "{walked}");
    }

    #[test]
    fn last_mission_finishes_the_tour() {
        let mut rig = rig();
        let store = ProgressStore::new(rig.dir.path().join("data"));
        store
            .save(&ProgressRecord {
                completed_missions: ["casa", "poste", "lago", "unisul", "ponte", "floresta"]
                    .map(String::from)
                    .to_vec(),
                total_distance: 1500.0,
                session_time: 60_000,
                ..ProgressRecord::default()
            })
            .unwrap();

        let t0 = Instant::now();
        rig.engine.start(t0);
        assert_eq!(rig.engine.board().progress().completed, 6);

        let praca = at(&rig.engine, "praca");
        rig.engine.on_fix(fix(praca, t0), t0);
        let events = rig.engine.tick(t0 + secs(3.0));

        assert!(events.contains(&TourEvent::MissionCompleted { id: "praca".into() }));
        assert_eq!(events.last(), Some(&TourEvent::TourCompleted));
        assert!(!rig.engine.is_running());

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.completed_missions.unwrap().len(), 7);
        assert_eq!(saved.session_time, Some(63_000));
    }

    #[test]
    fn narration_end_is_reported() {
        let mut rig = rig();
        let audios = rig.dir.path().join("audios");
        std::fs::create_dir_all(&audios).unwrap();
        write_wav(&audios.join("1 - Casa.wav"), 2);

        let t0 = Instant::now();
        rig.engine.start(t0);
        rig.engine.on_fix(fix(at(&rig.engine, "casa"), t0), t0);

        let events = rig.engine.tick(t0 + secs(2.0));
        assert!(events.contains(&TourEvent::NarrationEnded { id: "casa".into() }));
    }

    #[test]
    fn sound_off_means_no_narration() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        rig.engine.set_settings(
            Settings {
                sound_enabled: false,
                ..Settings::default()
            },
            t0,
        );

        rig.engine.on_fix(fix(at(&rig.engine, "casa"), t0), t0);
        assert!(rig
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|c| !c.starts_with("play")));
    }

    #[test]
    fn refused_camera_means_no_overlay() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        let events = rig.engine.camera_result(Err(CameraError::NotAllowed));
        assert!(matches!(&events[..], [TourEvent::Error { .. }]));

        let events = rig.engine.on_fix(fix(at(&rig.engine, "lago"), t0), t0);
        assert_eq!(activated(&events), ["lago"]);
        assert!(!events
            .iter()
            .any(|e| matches!(e, TourEvent::OverlayShown { .. })));
    }

    #[test]
    fn granted_camera_shows_the_model() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        assert!(rig.engine.camera_result(Ok(())).is_empty());

        let events = rig.engine.on_fix(fix(at(&rig.engine, "lago"), t0), t0);
        assert!(events.contains(&TourEvent::OverlayShown {
            id: "lago".into(),
            model: "models/portal.glb".into(),
        }));
        assert_eq!(
            rig.engine.overlay().shown(),
            Some(("lago", "models/portal.glb"))
        );
    }

    #[test]
    fn location_errors_are_reported_not_fatal() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);

        let events = rig.engine.on_location_error(LocationError::Timeout);
        assert_eq!(
            events,
            [TourEvent::Error {
                message: PlatformError::from(LocationError::Timeout)
                    .user_message()
                    .to_owned()
            }]
        );
        assert!(rig.engine.is_running());
        assert!(rig.engine.location_permitted());

        rig.engine.on_location_error(LocationError::PermissionDenied);
        assert!(!rig.engine.location_permitted());
        assert!(rig.engine.is_running());
        assert_eq!(rig.engine.errors().len(), 2);

        rig.engine.on_fix(fix(at(&rig.engine, "casa"), t0), t0);
        assert!(rig.engine.location_permitted());
    }

    #[test]
    fn storage_failures_do_not_stop_the_tour() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "a file, not a directory").unwrap();

        let t0 = Instant::now();
        let mut engine = TourEngine::new(
            TourDefinition::builtin().unwrap(),
            Platform::headless(dir.path()),
        )
        .with_store(ProgressStore::new(&blocked));
        engine.start(t0);
        engine.on_fix(fix(at(&engine, "casa"), t0), t0);
        let events = engine.tick(t0 + secs(3.0));

        assert!(events.contains(&TourEvent::MissionCompleted { id: "casa".into() }));
        assert!(events.iter().any(|e| matches!(e, TourEvent::Error { .. })));
        assert!(engine.is_running());
    }

    #[test]
    fn restart_forgets_everything() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        rig.engine.on_fix(fix(at(&rig.engine, "casa"), t0), t0);
        rig.engine.tick(t0 + secs(3.0));
        assert_eq!(rig.engine.board().progress().completed, 1);

        let t1 = t0 + secs(10.0);
        rig.engine.restart(t1);
        assert!(rig.engine.is_running());
        assert_eq!(rig.engine.board().progress().completed, 0);
        assert_eq!(rig.engine.total_distance(), 0.0);
        assert_eq!(rig.engine.session_time(t1), Duration::ZERO);

        // the restarted tour can be walked again right away
        assert_eq!(
            activated(&rig.engine.on_fix(fix(at(&rig.engine, "casa"), t1), t1)),
            ["casa"]
        );
    }

    #[test]
    fn session_time_accumulates_across_runs() {
        let mut rig = rig();
        let t0 = Instant::now();
        rig.engine.start(t0);
        rig.engine.stop(t0 + secs(5.0));
        assert_eq!(rig.engine.session_time(t0 + secs(100.0)), secs(5.0));

        rig.engine.start(t0 + secs(10.0));
        assert_eq!(rig.engine.session_time(t0 + secs(12.0)), secs(7.0));
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let json = serde_json::to_value(TourEvent::ProximityAlert {
            id: "casa".into(),
            distance_m: 42.0,
        })
        .unwrap();
        assert_eq!(json["event"], "proximity_alert");
        assert_eq!(json["distance_m"], 42.0);

        let json = serde_json::to_value(TourEvent::TourCompleted).unwrap();
        assert_eq!(json["event"], "tour_completed");
    }
}
