//! File-backed progress.
//!
//! Two JSON documents live in the data directory:
//!
//! - `progress.json`, the running record:
//!   `{completedMissions, totalDistance, sessionTime, settings, timestamp}`,
//!   with distance in kilometres and times in milliseconds.
//! - `completions.json`, one entry per completed point:
//!   `{"<id>": {completedAt, sessionTime, totalDistance}}`.
//!
//! Loading is a merge: whatever a saved record leaves out keeps its current
//! value, settings included, so older or hand-edited files still load.

use crate::config::Settings;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

const PROGRESS_FILE: &str = "progress.json";
const COMPLETIONS_FILE: &str = "completions.json";

/// Distances are metres in memory and kilometres on disk.
pub mod km {
    use crate::geo::Meters;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(metres: &Meters, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(metres / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Meters, D::Error> {
        Ok(f64::deserialize(deserializer)? * 1000.0)
    }

    pub mod option {
        use crate::geo::Meters;
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Meters>, D::Error> {
            Ok(Option::<f64>::deserialize(deserializer)?.map(|km| km * 1000.0))
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub completed_missions: Vec<String>,
    /// Metres.
    #[serde(with = "km")]
    pub total_distance: f64,
    /// Milliseconds.
    pub session_time: u64,
    pub settings: Settings,
    /// When the record was written, unix milliseconds.
    pub timestamp: u64,
}

/// A progress record as found on disk, where any field may be missing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProgress {
    pub completed_missions: Option<Vec<String>>,
    /// Metres.
    #[serde(default, deserialize_with = "km::option::deserialize")]
    pub total_distance: Option<f64>,
    pub session_time: Option<u64>,
    pub settings: Option<SavedSettings>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSettings {
    pub sound_enabled: Option<bool>,
    pub vibration_enabled: Option<bool>,
    pub ar_enabled: Option<bool>,
}

impl ProgressRecord {
    /// Overlays whatever `saved` carries onto this record.
    pub fn merge(&mut self, saved: SavedProgress) {
        if let Some(completed) = saved.completed_missions {
            self.completed_missions = completed;
        }
        if let Some(distance) = saved.total_distance.filter(|d| d.is_finite() && *d >= 0.0) {
            self.total_distance = distance;
        }
        if let Some(time) = saved.session_time {
            self.session_time = time;
        }
        if let Some(settings) = saved.settings {
            let current = &mut self.settings;
            current.sound_enabled = settings.sound_enabled.unwrap_or(current.sound_enabled);
            current.vibration_enabled = settings
                .vibration_enabled
                .unwrap_or(current.vibration_enabled);
            current.ar_enabled = settings.ar_enabled.unwrap_or(current.ar_enabled);
        }
        if let Some(timestamp) = saved.timestamp {
            self.timestamp = timestamp;
        }
    }
}

/// Snapshot taken when a point is completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Unix milliseconds.
    pub completed_at: u64,
    pub session_time: u64,
    /// Metres.
    #[serde(with = "km")]
    pub total_distance: f64,
}

pub type Completions = BTreeMap<String, CompletionRecord>;

/// Things that go wrong reading or writing progress files.
#[derive(Debug)]
pub enum ProgressError {
    IoError(io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for ProgressError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ProgressError::IoError(error) => Cow::from(format!("io error: {}", error)),
            ProgressError::JsonError(error) => Cow::from(format!("json error: {}", error)),
        };
        write!(f, "{}", msg)
    }
}

impl std::error::Error for ProgressError {}

impl From<io::Error> for ProgressError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value)
    }
}

/// Reads and writes the progress documents in one directory.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    fn completions_path(&self) -> PathBuf {
        self.dir.join(COMPLETIONS_FILE)
    }

    /// The saved record, or `None` if nothing was saved yet.
    pub fn load(&self) -> Result<Option<SavedProgress>, ProgressError> {
        read_json(&self.progress_path())
    }

    /// Writes `record`, stamping it with the current time.
    pub fn save(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        let stamped = ProgressRecord {
            timestamp: unix_millis(),
            ..record.clone()
        };
        write_json(&self.dir, &self.progress_path(), &stamped)?;
        debug!(
            "progress saved, {} completed",
            stamped.completed_missions.len()
        );
        Ok(())
    }

    pub fn completions(&self) -> Result<Completions, ProgressError> {
        Ok(read_json(&self.completions_path())?.unwrap_or_default())
    }

    pub fn record_completion(
        &self,
        id: &str,
        record: CompletionRecord,
    ) -> Result<(), ProgressError> {
        let mut completions = self.completions()?;
        completions.insert(id.to_owned(), record);
        write_json(&self.dir, &self.completions_path(), &completions)
    }

    /// Removes the running record but keeps completion history.
    pub fn clear_progress(&self) -> Result<(), ProgressError> {
        remove_if_present(&self.progress_path())
    }

    /// Removes every saved document.
    pub fn clear(&self) -> Result<(), ProgressError> {
        remove_if_present(&self.progress_path())?;
        remove_if_present(&self.completions_path())?;
        info!("progress cleared in {}", self.dir.display());
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ProgressError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

/// Writes through a temporary file so a crash never leaves half a document.
fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<(), ProgressError> {
    fs::create_dir_all(dir)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), ProgressError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ProgressStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("data"));
        (dir, store)
    }

    #[test]
    fn nothing_saved_loads_as_none() {
        let (_dir, store) = store();
        assert_eq!(store.load().unwrap(), None);
        assert!(store.completions().unwrap().is_empty());
    }

    #[test]
    fn saved_record_comes_back() {
        let (_dir, store) = store();
        let record = ProgressRecord {
            completed_missions: vec!["casa".into(), "poste".into()],
            total_distance: 312.5,
            session_time: 90_000,
            settings: Settings {
                vibration_enabled: false,
                ..Settings::default()
            },
            timestamp: 0,
        };
        store.save(&record).unwrap();

        let mut loaded = ProgressRecord::default();
        loaded.merge(store.load().unwrap().unwrap());
        assert_eq!(loaded.completed_missions, record.completed_missions);
        assert_eq!(loaded.total_distance, 312.5);
        assert_eq!(loaded.session_time, 90_000);
        assert!(!loaded.settings.vibration_enabled);
        assert!(loaded.timestamp > 0);
    }

    #[test]
    fn uses_the_documented_field_names() {
        let (_dir, store) = store();
        store.save(&ProgressRecord::default()).unwrap();

        let text = fs::read_to_string(store.dir().join(PROGRESS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        for key in ["completedMissions", "totalDistance", "sessionTime", "settings", "timestamp"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["settings"].get("arEnabled").is_some());
    }

    #[test]
    fn distance_is_kilometres_on_disk() {
        let (_dir, store) = store();
        store
            .save(&ProgressRecord {
                total_distance: 1250.0,
                ..ProgressRecord::default()
            })
            .unwrap();
        let text = fs::read_to_string(store.dir().join(PROGRESS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["totalDistance"], 1.25);

        let saved: SavedProgress = serde_json::from_str(r#"{"totalDistance": 0.5}"#).unwrap();
        assert_eq!(saved.total_distance, Some(500.0));

        let completion: CompletionRecord =
            serde_json::from_str(r#"{"completedAt": 1, "sessionTime": 2, "totalDistance": 2.0}"#)
                .unwrap();
        assert_eq!(completion.total_distance, 2000.0);
    }

    #[test]
    fn partial_records_keep_current_values() {
        let mut current = ProgressRecord {
            completed_missions: vec!["lago".into()],
            total_distance: 10.0,
            session_time: 5,
            settings: Settings {
                sound_enabled: false,
                ..Settings::default()
            },
            timestamp: 1,
        };
        let saved: SavedProgress =
            serde_json::from_str(r#"{"sessionTime": 99, "settings": {"arEnabled": false}}"#)
                .unwrap();

        current.merge(saved);
        assert_eq!(current.completed_missions, ["lago"]);
        assert_eq!(current.total_distance, 10.0);
        assert_eq!(current.session_time, 99);
        assert!(!current.settings.sound_enabled);
        assert!(!current.settings.ar_enabled);
        assert!(current.settings.vibration_enabled);
    }

    #[test]
    fn completions_accumulate() {
        let (_dir, store) = store();
        let rec = |at| CompletionRecord {
            completed_at: at,
            session_time: at / 2,
            total_distance: 1.0,
        };
        store.record_completion("casa", rec(100)).unwrap();
        store.record_completion("poste", rec(200)).unwrap();

        let completions = store.completions().unwrap();
        assert_eq!(completions.len(), 2);
        assert_eq!(completions["poste"].completed_at, 200);
    }

    #[test]
    fn clear_removes_everything_and_tolerates_absence() {
        let (_dir, store) = store();
        store.save(&ProgressRecord::default()).unwrap();
        store
            .record_completion(
                "casa",
                CompletionRecord {
                    completed_at: 1,
                    session_time: 1,
                    total_distance: 0.0,
                },
            )
            .unwrap();

        store.clear_progress().unwrap();
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.completions().unwrap().len(), 1);

        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.completions().unwrap().is_empty());
    }

    #[test]
    fn corrupt_files_are_json_errors() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(PROGRESS_FILE), "{ nope").unwrap();
        assert!(matches!(store.load(), Err(ProgressError::JsonError(_))));
    }
}
