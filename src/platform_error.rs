//! Failures reported by the host capabilities the tour leans on, and the
//! fixed table of messages shown to the walker for each of them.
//!
//! None of these are fatal. A refused camera only turns the overlay off, a
//! blocked audio clip only skips narration, and a GPS timeout keeps the
//! receiver running.

use log::error;
use rand::{distributions::Alphanumeric, Rng};
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

const MAX_LOG_SIZE: usize = 100;
const RECENT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    NotAllowed,
    NotFound,
    NotSupported,
    NotReadable,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    NotAllowed,
    NotSupported,
    Network,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    Location(LocationError),
    Camera(CameraError),
    Audio(AudioError),
    Network(String),
    Storage(String),
}

/// Coarse grouping used for error statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Location,
    Camera,
    Audio,
    Network,
    Storage,
}

impl PlatformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::Location(_) => ErrorKind::Location,
            PlatformError::Camera(_) => ErrorKind::Camera,
            PlatformError::Audio(_) => ErrorKind::Audio,
            PlatformError::Network(_) => ErrorKind::Network,
            PlatformError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// The message shown to the walker.
    pub fn user_message(&self) -> &'static str {
        use AudioError as AE;
        use CameraError as CE;
        use LocationError as LE;
        use PlatformError as PE;

        match self {
            PE::Location(LE::PermissionDenied) => {
                "Location permission denied. Enable location access in your settings."
            }
            PE::Location(LE::PositionUnavailable) => {
                "Location unavailable. Check that GPS is turned on."
            }
            PE::Location(LE::Timeout) => "Location timed out. Trying again...",
            PE::Location(LE::Other(_)) => "GPS error. Check that location is enabled.",
            PE::Camera(CE::NotAllowed) => {
                "Camera permission denied. Augmented reality will not be available."
            }
            PE::Camera(CE::NotFound) => "No camera found on this device.",
            PE::Camera(CE::NotSupported) => "Camera not supported on this device.",
            PE::Camera(CE::NotReadable) => "The camera is in use by another application.",
            PE::Camera(CE::Other(_)) => "Could not access the camera. Check its permissions.",
            PE::Audio(AE::NotAllowed) => "Audio playback was blocked. Tap to enable sound.",
            PE::Audio(AE::NotSupported) => "Audio format not supported.",
            PE::Audio(AE::Network) => "Network error while loading audio. Check your connection.",
            PE::Audio(AE::Other(_)) => "Could not play audio. Check your sound settings.",
            PE::Network(_) => "Connection problem. Check your internet access.",
            PE::Storage(_) => "Could not save data. Check the available space.",
        }
    }

    /// Tracking keeps running through these.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Location(LocationError::Timeout))
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Location(LocationError::Other(detail))
            | PlatformError::Camera(CameraError::Other(detail))
            | PlatformError::Audio(AudioError::Other(detail))
            | PlatformError::Network(detail)
            | PlatformError::Storage(detail) => {
                write!(f, "{:?} error: {}", self.kind(), detail)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<LocationError> for PlatformError {
    fn from(value: LocationError) -> Self {
        Self::Location(value)
    }
}

impl From<CameraError> for PlatformError {
    fn from(value: CameraError) -> Self {
        Self::Camera(value)
    }
}

impl From<AudioError> for PlatformError {
    fn from(value: AudioError) -> Self {
        Self::Audio(value)
    }
}

impl From<hound::Error> for AudioError {
    fn from(value: hound::Error) -> Self {
        match value {
            hound::Error::FormatError(_) | hound::Error::Unsupported => AudioError::NotSupported,
            other => AudioError::Other(other.to_string()),
        }
    }
}

/// One logged failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub id: String,
    pub error: PlatformError,
    pub at: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStats {
    pub total: usize,
    pub by_kind: HashMap<ErrorKind, usize>,
    pub recent: Vec<ErrorEntry>,
}

/// A bounded record of platform failures. The oldest entry is evicted once
/// the log holds a hundred.
#[derive(Debug, Default)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `error` and returns the id it was filed under.
    pub fn record(&mut self, error: PlatformError) -> String {
        let id = generate_error_id();
        error!("{id}: {error}");

        self.entries.push_back(ErrorEntry {
            id: id.clone(),
            error,
            at: SystemTime::now(),
        });
        if self.entries.len() > MAX_LOG_SIZE {
            self.entries.pop_front();
        }
        id
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> ErrorStats {
        let mut by_kind = HashMap::new();
        for entry in &self.entries {
            *by_kind.entry(entry.error.kind()).or_insert(0) += 1;
        }
        let skip = self.entries.len().saturating_sub(RECENT);
        ErrorStats {
            total: self.entries.len(),
            by_kind,
            recent: self.entries.iter().skip(skip).cloned().collect(),
        }
    }
}

fn generate_error_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("err_{millis}_{}", suffix.to_lowercase())
}
