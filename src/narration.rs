//! Narration playback bookkeeping.
//!
//! Decoding and output belong to the host, behind [`AudioSink`]. What lives
//! here is everything around it: reading each clip's length from its WAV
//! header with [hound], making sure only one clip plays at a time,
//! volume/mute, and noticing when a clip has played to its end.

use crate::platform_error::AudioError;

use hound::WavReader;
use log::{debug, info, warn};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// A narration clip known to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub id: String,
    pub path: PathBuf,
    /// Length read from the file header, `None` if it could not be read.
    pub duration: Option<Duration>,
}

/// The host's audio output.
pub trait AudioSink {
    /// Starts `clip` from `offset`.
    fn play(&mut self, clip: &Clip, offset: Duration, volume: f32) -> Result<(), AudioError>;
    fn pause(&mut self, id: &str);
    fn stop(&mut self, id: &str);
    fn set_volume(&mut self, volume: f32);
}

/// An [`AudioSink`] for hosts without speakers, which logs what would play.
#[derive(Debug, Default)]
pub struct LogSink;

impl AudioSink for LogSink {
    fn play(&mut self, clip: &Clip, offset: Duration, volume: f32) -> Result<(), AudioError> {
        info!(
            "playing {} from {:.1}s at volume {:.2}",
            clip.path.display(),
            offset.as_secs_f32(),
            volume
        );
        Ok(())
    }

    fn pause(&mut self, id: &str) {
        info!("pausing {id}");
    }

    fn stop(&mut self, id: &str) {
        debug!("stopping {id}");
    }

    fn set_volume(&mut self, volume: f32) {
        debug!("volume {volume:.2}");
    }
}

/// Reads the length of a WAV file from its header.
pub fn wav_duration(path: impl AsRef<Path>) -> Result<Duration, AudioError> {
    let reader = WavReader::open(path)?;
    let rate = reader.spec().sample_rate;
    if rate == 0 {
        return Err(AudioError::NotSupported);
    }
    Ok(Duration::from_secs_f64(reader.duration() as f64 / rate as f64))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlayState {
    /// Playing since `started`, having already played `offset` before that.
    Playing { started: Instant, offset: Duration },
    Paused { offset: Duration },
}

#[derive(Debug, Clone, PartialEq)]
struct NowPlaying {
    clip: Clip,
    state: PlayState,
}

/// Snapshot of the narration system for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStats {
    pub loaded: usize,
    pub currently_playing: Option<String>,
    pub volume: f32,
    pub muted: bool,
}

pub struct Narrator {
    sink: Box<dyn AudioSink + Send>,
    root: PathBuf,
    clips: HashMap<String, Clip>,
    current: Option<NowPlaying>,
    volume: f32,
    muted: bool,
}

impl Narrator {
    /// Clip paths are resolved against `root`.
    pub fn new(sink: Box<dyn AudioSink + Send>, root: impl Into<PathBuf>, volume: f32) -> Self {
        Self {
            sink,
            root: root.into(),
            clips: HashMap::new(),
            current: None,
            volume: volume.clamp(0.0, 1.0),
            muted: false,
        }
    }

    /// Registers a clip, reading its header once. Loading the same id again
    /// returns the clip already known.
    pub fn load(&mut self, id: &str, path: &str) -> Result<&Clip, AudioError> {
        if !self.clips.contains_key(id) {
            let full = self.root.join(path);
            let duration = wav_duration(&full)?;
            debug!("loaded {} ({:.1}s)", full.display(), duration.as_secs_f32());
            self.clips.insert(
                id.to_owned(),
                Clip {
                    id: id.to_owned(),
                    path: full,
                    duration: Some(duration),
                },
            );
        }
        Ok(&self.clips[id])
    }

    /// Loads every clip, returning the ids that failed along with why.
    pub fn preload<'a>(
        &mut self,
        clips: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Vec<(String, AudioError)> {
        let failures: Vec<_> = clips
            .into_iter()
            .filter_map(|(id, path)| self.load(id, path).err().map(|e| (id.to_owned(), e)))
            .collect();
        if failures.is_empty() {
            info!("all narration preloaded");
        } else {
            warn!("{} narration clip(s) failed to load", failures.len());
        }
        failures
    }

    fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Plays clip `id` from the start, stopping whatever was playing.
    ///
    /// A clip that was never loaded is registered on the fly; if its header
    /// cannot be read it still plays, it just never reports its end.
    pub fn play(&mut self, id: &str, path: &str, now: Instant) -> Result<(), AudioError> {
        self.stop_current();

        let clip = match self.load(id, path) {
            Ok(clip) => clip.clone(),
            Err(e) => {
                warn!("no header for {path}: {e:?}");
                Clip {
                    id: id.to_owned(),
                    path: self.root.join(path),
                    duration: None,
                }
            }
        };

        let volume = self.effective_volume();
        self.sink.play(&clip, Duration::ZERO, volume)?;
        self.current = Some(NowPlaying {
            clip,
            state: PlayState::Playing {
                started: now,
                offset: Duration::ZERO,
            },
        });
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> bool {
        let Some(current) = self.current.as_mut() else {
            return false;
        };
        let PlayState::Playing { started, offset } = current.state else {
            return false;
        };
        current.state = PlayState::Paused {
            offset: offset + now.saturating_duration_since(started),
        };
        self.sink.pause(&current.clip.id);
        true
    }

    pub fn resume(&mut self, now: Instant) -> Result<bool, AudioError> {
        let volume = self.effective_volume();
        let Some(current) = self.current.as_mut() else {
            return Ok(false);
        };
        let PlayState::Paused { offset } = current.state else {
            return Ok(false);
        };
        self.sink.play(&current.clip, offset, volume)?;
        current.state = PlayState::Playing {
            started: now,
            offset,
        };
        Ok(true)
    }

    pub fn stop_current(&mut self) {
        if let Some(current) = self.current.take() {
            self.sink.stop(&current.clip.id);
        }
    }

    pub fn currently_playing(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.clip.id.as_str())
    }

    pub fn is_playing(&self, id: &str) -> bool {
        matches!(
            &self.current,
            Some(NowPlaying { clip, state: PlayState::Playing { .. } }) if clip.id == id
        )
    }

    /// How far into the current clip playback is.
    pub fn position(&self, now: Instant) -> Option<Duration> {
        self.current.as_ref().map(|c| match c.state {
            PlayState::Playing { started, offset } => {
                offset + now.saturating_duration_since(started)
            }
            PlayState::Paused { offset } => offset,
        })
    }

    pub fn duration(&self, id: &str) -> Option<Duration> {
        self.clips.get(id).and_then(|c| c.duration)
    }

    /// Reports the id of a clip that has played to its end, and forgets it.
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        let current = self.current.as_ref()?;
        let duration = current.clip.duration?;
        let played = self.position(now)?;
        if matches!(current.state, PlayState::Playing { .. }) && played >= duration {
            let id = current.clip.id.clone();
            self.current = None;
            info!("narration {id} finished");
            Some(id)
        } else {
            None
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.effective_volume());
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.sink.set_volume(self.effective_volume());
        self.muted
    }

    pub fn stats(&self) -> AudioStats {
        AudioStats {
            loaded: self.clips.len(),
            currently_playing: self.currently_playing().map(str::to_owned),
            volume: self.volume,
            muted: self.muted,
        }
    }

    /// Stops playback and forgets every loaded clip.
    pub fn cleanup(&mut self) {
        self.stop_current();
        self.clips.clear();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::sync::{Arc, Mutex};

    /// Records calls made to the sink.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct RecordingSink {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl AudioSink for RecordingSink {
        fn play(&mut self, clip: &Clip, offset: Duration, _volume: f32) -> Result<(), AudioError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("play {} {}", clip.id, offset.as_millis()));
            Ok(())
        }

        fn pause(&mut self, id: &str) {
            self.calls.lock().unwrap().push(format!("pause {id}"));
        }

        fn stop(&mut self, id: &str) {
            self.calls.lock().unwrap().push(format!("stop {id}"));
        }

        fn set_volume(&mut self, volume: f32) {
            self.calls.lock().unwrap().push(format!("volume {volume}"));
        }
    }

    /// Writes a silent mono WAV of `secs` seconds at 8 kHz.
    pub(crate) fn write_wav(path: &Path, secs: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for _ in 0..(8000 * secs) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn narrator(dir: &Path) -> (Narrator, Arc<Mutex<Vec<String>>>) {
        let sink = RecordingSink::default();
        let calls = sink.calls.clone();
        (Narrator::new(Box::new(sink), dir, 0.8), calls)
    }

    #[test]
    fn reads_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 2);
        assert_eq!(wav_duration(dir.path().join("a.wav")).unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn playing_a_clip_stops_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 1);
        write_wav(&dir.path().join("b.wav"), 1);
        let (mut n, calls) = narrator(dir.path());
        let t0 = Instant::now();

        n.play("a", "a.wav", t0).unwrap();
        n.play("b", "b.wav", t0).unwrap();

        assert_eq!(n.currently_playing(), Some("b"));
        assert_eq!(*calls.lock().unwrap(), ["play a 0", "stop a", "play b 0"]);
    }

    #[test]
    fn tick_reports_the_end_once() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 2);
        let (mut n, _) = narrator(dir.path());
        let t0 = Instant::now();

        n.play("a", "a.wav", t0).unwrap();
        assert_eq!(n.tick(t0 + Duration::from_secs(1)), None);
        assert_eq!(n.tick(t0 + Duration::from_secs(2)), Some("a".to_owned()));
        assert_eq!(n.tick(t0 + Duration::from_secs(3)), None);
        assert!(n.currently_playing().is_none());
    }

    #[test]
    fn paused_time_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 2);
        let (mut n, calls) = narrator(dir.path());
        let t0 = Instant::now();

        n.play("a", "a.wav", t0).unwrap();
        assert!(n.pause(t0 + Duration::from_secs(1)));
        assert!(!n.is_playing("a"));
        assert_eq!(n.tick(t0 + Duration::from_secs(5)), None);

        assert!(n.resume(t0 + Duration::from_secs(10)).unwrap());
        assert!(n.is_playing("a"));
        assert_eq!(n.tick(t0 + Duration::from_millis(10_500)), None);
        assert_eq!(n.tick(t0 + Duration::from_secs(11)), Some("a".to_owned()));
        assert!(calls.lock().unwrap().contains(&"play a 1000".to_owned()));
    }

    #[test]
    fn missing_files_still_play_without_an_end() {
        let dir = tempfile::tempdir().unwrap();
        let (mut n, _) = narrator(dir.path());
        let t0 = Instant::now();

        n.play("ghost", "ghost.wav", t0).unwrap();
        assert_eq!(n.currently_playing(), Some("ghost"));
        assert_eq!(n.tick(t0 + Duration::from_secs(3600)), None);
    }

    #[test]
    fn headerless_clip_resumes_on_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let (mut n, calls) = narrator(dir.path());
        let t0 = Instant::now();

        n.play("casa", "missing.mp3", t0).unwrap();
        assert!(n.pause(t0 + Duration::from_secs(1)));
        assert!(n.resume(t0 + Duration::from_secs(2)).unwrap());

        assert!(n.is_playing("casa"));
        assert_eq!(
            *calls.lock().unwrap(),
            ["play casa 0", "pause casa", "play casa 1000"]
        );
    }

    #[test]
    fn preload_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("a.wav"), 1);
        std::fs::write(dir.path().join("bad.wav"), b"definitely not riff").unwrap();
        let (mut n, _) = narrator(dir.path());

        let failures = n.preload([("a", "a.wav"), ("bad", "bad.wav"), ("gone", "gone.wav")]);
        let ids: Vec<_> = failures.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["bad", "gone"]);
        assert_eq!(n.stats().loaded, 1);
    }

    #[test]
    fn volume_is_clamped_and_mute_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let (mut n, calls) = narrator(dir.path());

        n.set_volume(1.7);
        assert_eq!(n.volume(), 1.0);
        assert!(n.toggle_mute());
        assert!(!n.toggle_mute());
        assert_eq!(*calls.lock().unwrap(), ["volume 1", "volume 0", "volume 1"]);
    }
}
